use super::datadoc::{DATA_NAMESPACE, DATA_ROOT};

pub const BINDING_PREFIX: &str = "ns0";

/// `/ns0:root/ns0:<name>` for a bound field.
pub fn binding_xpath(element_name: &str) -> String {
    format!("/{BINDING_PREFIX}:{DATA_ROOT}/{BINDING_PREFIX}:{element_name}")
}

/// `xmlns:ns0='template-data'`, the prefix mapping stored next to [`binding_xpath`].
pub fn binding_prefix_mappings() -> String {
    format!("xmlns:{BINDING_PREFIX}='{DATA_NAMESPACE}'")
}

/// Local element name addressed by the final step of a binding path.
///
/// Steps are separated by `/`; the predicate (`[...]`) and any namespace prefix are
/// removed from the last non-empty step. Returns `None` when nothing is left.
pub fn final_step_local_name(xpath: &str) -> Option<&str> {
    let step = xpath.split('/').filter(|s| !s.trim().is_empty()).last()?;
    let step = step.split('[').next().unwrap_or(step).trim();
    let local = step.rsplit(':').next().unwrap_or(step);
    if local.is_empty() {
        None
    } else {
        Some(local)
    }
}

#[cfg(test)]
mod tests {
    use super::{binding_prefix_mappings, binding_xpath, final_step_local_name};

    #[test]
    fn binding_path_round_trips() {
        let xpath = binding_xpath("Order_id");
        assert_eq!(xpath, "/ns0:root/ns0:Order_id");
        assert_eq!(final_step_local_name(&xpath), Some("Order_id"));
        assert_eq!(binding_prefix_mappings(), "xmlns:ns0='template-data'");
    }

    #[test]
    fn edge_cases() {
        assert_eq!(final_step_local_name(""), None);
        assert_eq!(final_step_local_name("/"), None);
        assert_eq!(final_step_local_name("name"), Some("name"));
        assert_eq!(final_step_local_name("/ns0:root/ns0:item[1]"), Some("item"));
        assert_eq!(final_step_local_name("/a:root/b:c:item"), Some("item"));
        assert_eq!(final_step_local_name("/ns0:root/ns0:item/"), Some("item"));
        assert_eq!(final_step_local_name("/ns0:root/ns0:[1]"), None);
        assert_eq!(final_step_local_name("/ns0:root/ns0:"), None);
    }
}
