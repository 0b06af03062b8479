pub mod documents;
pub mod generate;
pub mod merge;
pub mod naming;

pub use documents::{DocumentGenerator, FillReport};
pub use generate::{GenerationReport, TemplateGenerator};
pub use merge::{merge_data_sheets, MergeReport};
pub use naming::{collect_inputs, InputSelection, KeyFilter, KeyPlacement, LoadedFile, OutputNaming};
