use hnet_shared::dashboard::{
    AttachDetachInput, ClaimParams, Device, DeviceCrudInput, Devices, Group, GroupCrudInput,
    GroupDetails, Groups, UserResponse, find_device_id_by_hostname, find_group_id_by_name,
};
use reqwest::Method;
use serde_json::Value;
use std::net::IpAddr;

use super::{DashboardClient, DashboardError};
use crate::util::format::{bold, dim, table};

/// Discontinued join code format that claim no longer accepts.
const LEGACY_JOIN_CODE_PREFIX: &str = "fc94:b01d:1803:8dd8:b293:5c7d:7639:932a/";

/// Forwarded dashboard operations.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardOp {
    ClaimToken,
    RotateClaimToken,
    ListGroups,
    ShowGroup { id: String },
    CreateGroup(GroupCrudInput),
    UpdateGroup { id: String, input: GroupCrudInput },
    RemoveGroup { id: String },
    AttachDevice(AttachDetachInput),
    DetachDevice(AttachDetachInput),
    ListDevices,
    ShowDevice { id: String },
    UpdateDevice { id: String, input: DeviceCrudInput },
    UnclaimDevice { id: String },
    Claim(ClaimParams),
    UnclaimSelf,
}

impl DashboardOp {
    pub fn method(&self) -> Method {
        match self {
            DashboardOp::ClaimToken
            | DashboardOp::ListGroups
            | DashboardOp::ShowGroup { .. }
            | DashboardOp::ListDevices
            | DashboardOp::ShowDevice { .. } => Method::GET,
            DashboardOp::UpdateGroup { .. } | DashboardOp::UpdateDevice { .. } => Method::PUT,
            DashboardOp::RemoveGroup { .. } => Method::DELETE,
            DashboardOp::RotateClaimToken
            | DashboardOp::CreateGroup(_)
            | DashboardOp::AttachDevice(_)
            | DashboardOp::DetachDevice(_)
            | DashboardOp::UnclaimDevice { .. }
            | DashboardOp::Claim(_)
            | DashboardOp::UnclaimSelf => Method::POST,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            DashboardOp::ClaimToken => "/web/user".to_string(),
            DashboardOp::RotateClaimToken => "/web/settings/rotate-claim-token".to_string(),
            DashboardOp::ListGroups | DashboardOp::CreateGroup(_) => "/web/groups".to_string(),
            DashboardOp::ShowGroup { id }
            | DashboardOp::UpdateGroup { id, .. }
            | DashboardOp::RemoveGroup { id } => format!("/web/groups/{}", id),
            DashboardOp::AttachDevice(_) => "/web/groups/attach-device".to_string(),
            DashboardOp::DetachDevice(_) => "/web/groups/detach-device".to_string(),
            DashboardOp::ListDevices => "/web/devices".to_string(),
            DashboardOp::ShowDevice { id } | DashboardOp::UpdateDevice { id, .. } => {
                format!("/web/devices/{}", id)
            }
            DashboardOp::UnclaimDevice { id } => format!("/web/devices/unclaim/{}", id),
            DashboardOp::Claim(_) => "/device/manage/claim".to_string(),
            DashboardOp::UnclaimSelf => "/device/manage/unclaim".to_string(),
        }
    }

    pub fn body(&self) -> Result<Option<Value>, DashboardError> {
        let value = match self {
            DashboardOp::CreateGroup(input) | DashboardOp::UpdateGroup { input, .. } => {
                serde_json::to_value(input)
            }
            DashboardOp::AttachDevice(input) | DashboardOp::DetachDevice(input) => {
                serde_json::to_value(input)
            }
            DashboardOp::UpdateDevice { input, .. } => serde_json::to_value(input),
            DashboardOp::Claim(params) => serde_json::to_value(params),
            _ => return Ok(None),
        };
        value.map(Some).map_err(|source| DashboardError::Decode {
            endpoint: self.endpoint(),
            source,
        })
    }

    fn validate(&self) -> Result<(), DashboardError> {
        if let DashboardOp::Claim(params) = self {
            if params.code.starts_with(LEGACY_JOIN_CODE_PREFIX) {
                return Err(DashboardError::Invalid(
                    "Provided token is old join code format, which is discontinued. Go to the dashboard to obtain a new one.".into(),
                ));
            }
            if params.code.trim().is_empty() {
                return Err(DashboardError::Invalid("claim code must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Perform the operation and render its result for the terminal.
    pub async fn run(&self, client: &DashboardClient) -> Result<String, DashboardError> {
        self.validate()?;
        let method = self.method();
        let endpoint = self.endpoint();
        let body = self.body()?;
        let body = body.as_ref();

        Ok(match self {
            DashboardOp::ClaimToken => {
                let user: UserResponse = client.call(method, &endpoint, body).await?;
                format!("Your claim token: {}", bold(&user.settings.claim_token))
            }
            DashboardOp::RotateClaimToken => {
                let user: UserResponse = client.call(method, &endpoint, body).await?;
                format!("New claim token: {}", bold(&user.settings.claim_token))
            }
            DashboardOp::ListGroups => {
                let groups: Groups = client.call(method, &endpoint, body).await?;
                render_groups(&groups)
            }
            DashboardOp::ShowGroup { .. } => {
                let details: GroupDetails = client.call(method, &endpoint, body).await?;
                render_group_details(&details)
            }
            DashboardOp::CreateGroup(_) => {
                let group: Group = client.call(method, &endpoint, body).await?;
                format!("Created group {} ({})", bold(&group.name), group.id)
            }
            DashboardOp::UpdateGroup { .. } => {
                let group: Group = client.call(method, &endpoint, body).await?;
                format!("Updated group {}", bold(&group.name))
            }
            DashboardOp::RemoveGroup { id } => {
                let _: Value = client.call(method, &endpoint, body).await?;
                format!("Removed group {}", id)
            }
            DashboardOp::AttachDevice(input) => {
                let _: Value = client.call(method, &endpoint, body).await?;
                format!("Attached {} to the group", input.device_ip)
            }
            DashboardOp::DetachDevice(input) => {
                let _: Value = client.call(method, &endpoint, body).await?;
                format!("Detached {} from the group", input.device_ip)
            }
            DashboardOp::ListDevices => {
                let devices: Devices = client.call(method, &endpoint, body).await?;
                render_devices(&devices)
            }
            DashboardOp::ShowDevice { .. } => {
                let device: Device = client.call(method, &endpoint, body).await?;
                render_device(&device)
            }
            DashboardOp::UpdateDevice { .. } => {
                let device: Device = client.call(method, &endpoint, body).await?;
                format!("Updated device {}", bold(&device.hostname))
            }
            DashboardOp::UnclaimDevice { id } => {
                let _: Value = client.call(method, &endpoint, body).await?;
                format!("Unclaimed device {}", id)
            }
            DashboardOp::Claim(_) => {
                let _: Value = client.call(method, &endpoint, body).await?;
                "Claim request was successful".to_string()
            }
            DashboardOp::UnclaimSelf => {
                let _: Value = client.call(method, &endpoint, body).await?;
                "This device was unclaimed".to_string()
            }
        })
    }
}

/// Accept a group id or a group name.
pub async fn resolve_group_id(client: &DashboardClient, group: &str) -> Result<String, DashboardError> {
    let groups: Groups = client.get("/web/groups").await?;
    if groups.iter().any(|g| g.id == group) {
        return Ok(group.to_string());
    }
    find_group_id_by_name(group, &groups)
        .map(str::to_string)
        .ok_or_else(|| DashboardError::Invalid(format!("no group named {}", group)))
}

/// Fields to change on a group. Unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub emoji: Option<String>,
    pub comment: Option<String>,
}

impl GroupChanges {
    pub fn apply(self, current: &Group) -> GroupCrudInput {
        GroupCrudInput {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            emoji: self.emoji.unwrap_or_else(|| current.emoji.clone()),
            comment: self.comment.unwrap_or_else(|| current.comment.clone()),
        }
    }
}

/// Fields to change on a device. Unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct DeviceChanges {
    pub hostname: Option<String>,
    pub emoji: Option<String>,
    pub comment: Option<String>,
    pub aliases: Option<Vec<String>>,
}

impl DeviceChanges {
    pub fn apply(self, current: &Device) -> DeviceCrudInput {
        DeviceCrudInput {
            hostname: self.hostname.unwrap_or_else(|| current.hostname.clone()),
            emoji: self.emoji.unwrap_or_else(|| current.emoji.clone()),
            comment: self.comment.unwrap_or_else(|| current.comment.clone()),
            aliases: self.aliases.unwrap_or_else(|| current.aliases.clone()),
        }
    }
}

/// Build a group update from the group's current state.
pub async fn update_group(
    client: &DashboardClient,
    group: &str,
    changes: GroupChanges,
) -> Result<DashboardOp, DashboardError> {
    let id = resolve_group_id(client, group).await?;
    let details: GroupDetails = client.get(&format!("/web/groups/{}", id)).await?;
    let input = changes.apply(&details.group);
    Ok(DashboardOp::UpdateGroup { id, input })
}

/// Build a device update from the device's current state.
pub async fn update_device(
    client: &DashboardClient,
    device: &str,
    changes: DeviceChanges,
) -> Result<DashboardOp, DashboardError> {
    let id = resolve_device_id(client, device).await?;
    let current: Device = client.get(&format!("/web/devices/{}", id)).await?;
    let input = changes.apply(&current);
    Ok(DashboardOp::UpdateDevice { id, input })
}

/// Accept a device id, address or hostname/alias.
pub async fn resolve_device_id(client: &DashboardClient, device: &str) -> Result<String, DashboardError> {
    let devices: Devices = client.get("/web/devices").await?;
    let by_ip = device
        .parse::<IpAddr>()
        .ok()
        .and_then(|ip| devices.iter().find(|d| d.ip.parse::<IpAddr>().ok() == Some(ip)));
    devices
        .iter()
        .find(|d| d.id == device)
        .or(by_ip)
        .map(|d| d.id.as_str())
        .or_else(|| find_device_id_by_hostname(device, &devices))
        .map(str::to_string)
        .ok_or_else(|| DashboardError::Invalid(format!("no device named {}", device)))
}

/// Accept a device address or a hostname/alias known to the dashboard.
pub async fn resolve_device_ip(client: &DashboardClient, device: &str) -> Result<String, DashboardError> {
    if device.parse::<IpAddr>().is_ok() {
        return Ok(device.to_string());
    }
    let devices: Devices = client.get("/web/devices").await?;
    let id = find_device_id_by_hostname(device, &devices)
        .ok_or_else(|| DashboardError::Invalid(format!("no device named {}", device)))?;
    devices
        .iter()
        .find(|d| d.id == id)
        .map(|d| d.ip.clone())
        .ok_or_else(|| DashboardError::Invalid(format!("no device named {}", device)))
}

fn render_groups(groups: &[Group]) -> String {
    let rows: Vec<Vec<String>> = groups
        .iter()
        .map(|g| {
            vec![
                g.id.clone(),
                g.emoji.clone(),
                g.name.clone(),
                g.devices.len().to_string(),
                g.comment.clone(),
            ]
        })
        .collect();
    table(&["ID", "Emoji", "Name", "Devices", "Comment"], &rows)
}

fn render_devices(devices: &[Device]) -> String {
    let rows: Vec<Vec<String>> = devices
        .iter()
        .map(|d| {
            vec![
                d.ip.clone(),
                d.emoji.clone(),
                d.hostname.clone(),
                d.aliases.join(", "),
                d.status.clone(),
                d.user_agent.clone(),
            ]
        })
        .collect();
    table(&["Address", "Emoji", "Hostname", "Aliases", "Status", "Version"], &rows)
}

fn render_device(device: &Device) -> String {
    let mut lines = vec![
        format!("{} {}", device.emoji, bold(&device.hostname)).trim().to_string(),
        format!("ID:          {}", device.id),
        format!("Address:     {}", device.ip),
        format!("Status:      {}", device.status),
        format!("Version:     {}", device.user_agent),
    ];
    if !device.aliases.is_empty() {
        lines.push(format!("Aliases:     {}", device.aliases.join(", ")));
    }
    if let Some(last) = &device.last_contact {
        lines.push(format!("Last seen:   {}", last));
    }
    if !device.comment.is_empty() {
        lines.push(dim(&device.comment));
    }
    lines.join("\n")
}

fn render_group_details(details: &GroupDetails) -> String {
    let group = &details.group;
    let mut out = vec![format!("{} {}", group.emoji, bold(&group.name)).trim().to_string()];
    if !group.comment.is_empty() {
        out.push(dim(&group.comment));
    }
    out.push(render_devices(&group.devices));
    if !details.join_code.token.is_empty() {
        out.push(format!("Join code: {}", details.join_code.token));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        assert_eq!(DashboardOp::ListGroups.endpoint(), "/web/groups");
        assert_eq!(DashboardOp::ListGroups.method(), Method::GET);
        assert_eq!(
            DashboardOp::UnclaimDevice { id: "d1".into() }.endpoint(),
            "/web/devices/unclaim/d1"
        );
        assert_eq!(
            DashboardOp::RemoveGroup { id: "g1".into() }.method(),
            Method::DELETE
        );
        assert_eq!(DashboardOp::UnclaimSelf.method(), Method::POST);
    }

    #[test]
    fn test_body_only_for_inputs() {
        assert_eq!(DashboardOp::ListDevices.body().unwrap(), None);
        let op = DashboardOp::AttachDevice(AttachDetachInput {
            group_id: "g1".into(),
            device_ip: "fc94::1".into(),
        });
        assert_eq!(
            op.body().unwrap(),
            Some(serde_json::json!({"groupId": "g1", "deviceIp": "fc94::1"}))
        );
    }

    #[test]
    fn test_legacy_join_code_is_rejected() {
        let op = DashboardOp::Claim(ClaimParams {
            code: format!("{}XYZ", LEGACY_JOIN_CODE_PREFIX),
            ..Default::default()
        });
        assert!(matches!(op.validate(), Err(DashboardError::Invalid(_))));
    }

    #[test]
    fn test_group_changes_keep_unset_fields() {
        let current = Group {
            id: "g1".into(),
            name: "lab".into(),
            emoji: "🧪".into(),
            comment: "bench".into(),
            ..Default::default()
        };
        let input = GroupChanges {
            comment: Some("rack 2".into()),
            ..Default::default()
        }
        .apply(&current);

        assert_eq!(
            input,
            GroupCrudInput {
                name: "lab".into(),
                emoji: "🧪".into(),
                comment: "rack 2".into(),
            }
        );
        let op = DashboardOp::UpdateGroup { id: "g1".into(), input };
        assert_eq!(op.method(), Method::PUT);
        assert_eq!(op.endpoint(), "/web/groups/g1");
        assert_eq!(
            op.body().unwrap(),
            Some(serde_json::json!({"name": "lab", "emoji": "🧪", "comment": "rack 2"}))
        );
    }

    #[test]
    fn test_device_changes_replace_aliases() {
        let current = Device {
            id: "d1".into(),
            hostname: "alpha".into(),
            aliases: vec!["a".into()],
            ..Default::default()
        };
        let input = DeviceChanges {
            aliases: Some(vec!["b".into(), "c".into()]),
            ..Default::default()
        }
        .apply(&current);

        assert_eq!(input.hostname, "alpha");
        assert_eq!(input.aliases, vec!["b".to_string(), "c".to_string()]);
        let op = DashboardOp::UpdateDevice { id: "d1".into(), input };
        assert_eq!(op.method(), Method::PUT);
        assert_eq!(op.endpoint(), "/web/devices/d1");
    }

    #[test]
    fn test_render_groups_counts_devices() {
        let groups = vec![Group {
            id: "g1".into(),
            name: "lab".into(),
            devices: vec![Device::default(), Device::default()],
            ..Default::default()
        }];
        let out = render_groups(&groups);
        let row = out.lines().nth(1).unwrap();
        assert!(row.starts_with("g1"));
        assert!(row.contains("lab"));
        assert!(row.contains('2'));
    }
}
