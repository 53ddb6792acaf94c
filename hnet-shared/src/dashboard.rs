use serde::{Deserialize, Serialize};

/// Envelope returned by the dashboard REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.kind == "success"
    }

    pub fn failure_message(&self) -> String {
        match self.errors.first() {
            Some(first) => format!("API request failed. Message: {}", first),
            None => "API request failed.".to_string(),
        }
    }
}

/// Body shape of infrastructure-level (non-2xx) errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MaybeError {
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, rename = "userAgent")]
    pub user_agent: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "lastContact")]
    pub last_contact: Option<String>,
}

pub type Devices = Vec<Device>;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct JoinCode {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Group {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub devices: Devices,
    #[serde(default, rename = "joinCodes")]
    pub join_codes: Vec<JoinCode>,
}

pub type Groups = Vec<Group>;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GroupDetails {
    #[serde(default)]
    pub group: Group,
    #[serde(default, rename = "attachableDevices")]
    pub attachable_devices: Devices,
    #[serde(default, rename = "joinCode")]
    pub join_code: JoinCode,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserSettings {
    #[serde(default, rename = "claimToken")]
    pub claim_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserResponse {
    #[serde(default)]
    pub settings: UserSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClaimParams {
    pub code: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub hostname: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub comment: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GroupCrudInput {
    pub name: String,
    pub emoji: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeviceCrudInput {
    pub emoji: String,
    pub hostname: String,
    pub comment: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AttachDetachInput {
    #[serde(rename = "groupId")]
    pub group_id: String,
    #[serde(rename = "deviceIp")]
    pub device_ip: String,
}

/// Find a group id by its display name.
pub fn find_group_id_by_name<'a>(needle: &str, haystack: &'a [Group]) -> Option<&'a str> {
    haystack
        .iter()
        .find(|g| g.name == needle)
        .map(|g| g.id.as_str())
}

/// Find a device id by hostname or any of its aliases. First match wins.
pub fn find_device_id_by_hostname<'a>(hostname: &str, haystack: &'a [Device]) -> Option<&'a str> {
    haystack
        .iter()
        .find(|d| d.hostname == hostname || d.aliases.iter().any(|a| a == hostname))
        .map(|d| d.id.as_str())
}
