pub mod binding;
pub mod fill;
pub mod package;
pub mod parts;
pub mod runs;
pub mod tree;
pub mod xml;

pub use binding::ContentControlBinder;
pub use fill::fill_bound_fields;
pub use package::DocxPackage;
pub use parts::ContentParts;
