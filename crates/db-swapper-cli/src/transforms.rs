//! Business transforms selectable through `transform_function`.

use db_swapper::sync::{RenameColumns, TransformRegistry};

/// Registry with every transform shipped with the binary.
pub fn builtin() -> TransformRegistry {
    TransformRegistry::new()
        .with(
            "transformDataModelPhones",
            RenameColumns::new([
                ("VENDOR_NAME", "vendorName"),
                ("MODEL_NAME", "modelName"),
                ("TAC", "tac"),
            ]),
        )
        .with(
            "transformDataAllImsi",
            RenameColumns::new([
                ("CLIENT", "client"),
                ("CONTRACT", "contract"),
                ("ICCID", "iccid"),
                ("IMSI", "imsi"),
                ("MSISDN", "msisdn"),
                ("STATUS", "status"),
                ("TYPESIM", "typeSim"),
                ("DEPARTMENT", "department"),
            ]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_swapper::core::{Record, Value};
    use db_swapper::sync::RecordTransform;

    #[test]
    fn test_builtin_names() {
        let registry = builtin();
        assert!(registry.contains("transformDataModelPhones"));
        assert!(registry.contains("transformDataAllImsi"));
    }

    #[test]
    fn test_model_phones_renames() {
        let transform = builtin().resolve(Some("transformDataModelPhones"));
        let record: Record = [
            ("VENDOR_NAME".to_string(), Value::from("Acme")),
            ("TAC".to_string(), Value::from("35123456")),
            ("extra".to_string(), Value::Int(1)),
        ]
        .into_iter()
        .collect();

        let out = transform.transform(record);
        assert_eq!(out.get("vendorName"), Some(&Value::from("Acme")));
        assert_eq!(out.get("tac"), Some(&Value::from("35123456")));
        assert_eq!(out.get("extra"), Some(&Value::Int(1)));
        assert!(!out.contains_key("VENDOR_NAME"));
    }

    #[test]
    fn test_all_imsi_renames() {
        let transform = builtin().resolve(Some("transformDataAllImsi"));
        let record: Record = [("TYPESIM".to_string(), Value::from("esim"))]
            .into_iter()
            .collect();
        let out = transform.transform(record);
        assert_eq!(out.get("typeSim"), Some(&Value::from("esim")));
    }
}
