pub mod datadoc;
pub mod sanitize;
pub mod scan;
pub mod xpath;

pub use datadoc::{build_data_document, build_tag_map, DataDocument, DataEntry, TagMap, DATA_NAMESPACE};
pub use sanitize::sanitize_xml_name;
pub use scan::scan_tags;
