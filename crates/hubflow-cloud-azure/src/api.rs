//! Resource-manager routes per resource kind

use hubflow_cloud::{CloudError, ResourceDescriptor, ResourceKind};

pub(crate) const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";

/// How a globally scoped name is checked before creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NameCheck {
    /// No global namespace
    None,
    /// `POST /subscriptions/{sub}/providers/{provider}/checkNameAvailability`
    Post { type_name: Option<&'static str> },
    /// `HEAD /providers/{provider}/databaseAccountNames/{name}`, 200 means taken
    Head,
}

/// Routing data of one resource kind
#[derive(Debug, Clone, Copy)]
pub(crate) struct KindApi {
    pub provider: &'static str,
    /// Type segments from the outermost parent down to the kind itself
    pub segments: &'static [&'static str],
    pub api_version: &'static str,
    pub name_check: NameCheck,
}

pub(crate) fn kind_api(kind: ResourceKind) -> KindApi {
    match kind {
        ResourceKind::ResourceGroup => KindApi {
            provider: "Microsoft.Resources",
            segments: &["resourceGroups"],
            api_version: RESOURCE_GROUP_API_VERSION,
            name_check: NameCheck::None,
        },
        ResourceKind::DeviceRegistry => KindApi {
            provider: "Microsoft.Devices",
            segments: &["IotHubs"],
            api_version: "2021-07-02",
            name_check: NameCheck::Post { type_name: None },
        },
        ResourceKind::DocumentStore => KindApi {
            provider: "Microsoft.DocumentDB",
            segments: &["databaseAccounts"],
            api_version: "2021-10-15",
            name_check: NameCheck::Head,
        },
        ResourceKind::DocumentDatabase => KindApi {
            provider: "Microsoft.DocumentDB",
            segments: &["databaseAccounts", "sqlDatabases"],
            api_version: "2021-10-15",
            name_check: NameCheck::None,
        },
        ResourceKind::DocumentContainer => KindApi {
            provider: "Microsoft.DocumentDB",
            segments: &["databaseAccounts", "sqlDatabases", "containers"],
            api_version: "2021-10-15",
            name_check: NameCheck::None,
        },
        ResourceKind::ComputePlan => KindApi {
            provider: "Microsoft.Web",
            segments: &["serverfarms"],
            api_version: "2021-02-01",
            name_check: NameCheck::None,
        },
        ResourceKind::StorageAccount => KindApi {
            provider: "Microsoft.Storage",
            segments: &["storageAccounts"],
            api_version: "2021-08-01",
            name_check: NameCheck::Post {
                type_name: Some("Microsoft.Storage/storageAccounts"),
            },
        },
        ResourceKind::ComputeHost => KindApi {
            provider: "Microsoft.Web",
            segments: &["sites"],
            api_version: "2021-02-01",
            name_check: NameCheck::Post {
                type_name: Some("Microsoft.Web/sites"),
            },
        },
    }
}

pub(crate) fn subscription_path(subscription_id: &str) -> String {
    format!("/subscriptions/{}", subscription_id)
}

pub(crate) fn resource_group_path(subscription_id: &str, group: &str) -> String {
    format!("{}/resourceGroups/{}", subscription_path(subscription_id), group)
}

/// Path of the collection `kind` lives in, below its parents
pub(crate) fn collection_path(
    subscription_id: &str,
    kind: ResourceKind,
    group: &str,
    parents: &[String],
) -> Result<String, CloudError> {
    if kind == ResourceKind::ResourceGroup {
        return Ok(format!("{}/resourceGroups", subscription_path(subscription_id)));
    }

    let api = kind_api(kind);
    if parents.len() + 1 != api.segments.len() {
        return Err(CloudError::InvalidConfig(format!(
            "{} needs {} parent name(s), got {}",
            kind,
            api.segments.len() - 1,
            parents.len()
        )));
    }

    let mut path = format!(
        "{}/providers/{}",
        resource_group_path(subscription_id, group),
        api.provider
    );
    for (segment, parent) in api.segments.iter().zip(parents) {
        path.push('/');
        path.push_str(segment);
        path.push('/');
        path.push_str(parent);
    }
    path.push('/');
    path.push_str(api.segments[api.segments.len() - 1]);
    Ok(path)
}

/// Full resource path; this is also the resource identifier
pub(crate) fn resource_path(
    subscription_id: &str,
    descriptor: &ResourceDescriptor,
) -> Result<String, CloudError> {
    if descriptor.kind == ResourceKind::ResourceGroup {
        return Ok(resource_group_path(subscription_id, &descriptor.name));
    }
    let collection = collection_path(
        subscription_id,
        descriptor.kind,
        &descriptor.group,
        &descriptor.parents,
    )?;
    Ok(format!("{}/{}", collection, descriptor.name))
}

/// Extract a readable message from an error body
///
/// Resource-manager errors are `{"error": {"code", "message"}}`; the device
/// registry answers `{"Message": "...", "ExceptionMessage": "..."}`.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.trim().to_string(),
    };
    if let Some(error) = parsed.get("error") {
        let code = error.get("code").and_then(|c| c.as_str());
        let message = error.get("message").and_then(|m| m.as_str());
        match (code, message) {
            (Some(code), Some(message)) => return format!("{}: {}", code, message),
            (None, Some(message)) => return message.to_string(),
            _ => {}
        }
    }
    if let Some(message) = parsed.get("Message").and_then(|m| m.as_str()) {
        return message.to_string();
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUB: &str = "0000-1111";

    #[test]
    fn test_top_level_resource_path() {
        let d = ResourceDescriptor::new(
            ResourceKind::StorageAccount,
            "storage0materialfluss12345",
            "North Europe",
            "IoT-project",
        );
        assert_eq!(
            resource_path(SUB, &d).unwrap(),
            "/subscriptions/0000-1111/resourceGroups/IoT-project/providers/Microsoft.Storage/storageAccounts/storage0materialfluss12345"
        );
    }

    #[test]
    fn test_nested_resource_path() {
        let account = ResourceDescriptor::new(
            ResourceKind::DocumentStore,
            "cosmos1",
            "North Europe",
            "rg",
        );
        let db = account.child(ResourceKind::DocumentDatabase, "iot");
        let container = db.child(ResourceKind::DocumentContainer, "messages");
        assert_eq!(
            resource_path(SUB, &container).unwrap(),
            "/subscriptions/0000-1111/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/cosmos1/sqlDatabases/iot/containers/messages"
        );
        assert_eq!(
            collection_path(SUB, ResourceKind::DocumentDatabase, "rg", &["cosmos1".to_string()])
                .unwrap(),
            "/subscriptions/0000-1111/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/cosmos1/sqlDatabases"
        );
    }

    #[test]
    fn test_resource_group_path() {
        let d = ResourceDescriptor::resource_group("IoT-project", "North Europe");
        assert_eq!(
            resource_path(SUB, &d).unwrap(),
            "/subscriptions/0000-1111/resourceGroups/IoT-project"
        );
    }

    #[test]
    fn test_parent_count_mismatch() {
        let err = collection_path(SUB, ResourceKind::DocumentContainer, "rg", &[]).unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[test]
    fn test_name_checks_match_global_kinds() {
        for kind in [
            ResourceKind::ResourceGroup,
            ResourceKind::DeviceRegistry,
            ResourceKind::DocumentStore,
            ResourceKind::DocumentDatabase,
            ResourceKind::DocumentContainer,
            ResourceKind::ComputePlan,
            ResourceKind::StorageAccount,
            ResourceKind::ComputeHost,
        ] {
            assert_eq!(
                kind_api(kind).name_check != NameCheck::None,
                kind.requires_name_check(),
                "{}",
                kind
            );
        }
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":{"code":"Conflict","message":"name in use"}}"#),
            "Conflict: name in use"
        );
        assert_eq!(
            error_message(r#"{"Message":"ErrorCode:DeviceAlreadyExists;A device with ID 'dev-1' is already registered."}"#),
            "ErrorCode:DeviceAlreadyExists;A device with ID 'dev-1' is already registered."
        );
        assert_eq!(error_message("  plain text \n"), "plain text");
    }
}
