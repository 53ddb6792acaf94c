use serde_json::{Value, json};

use crate::auth::{AuthApi, AuthError, AuthSession, CredentialPrompt, TokenStore};
use crate::util::format::table;

const LIST_GROUPS: &str = "query ListGroups { groups { id name deviceCount } }";

const SHOW_GROUP: &str = "query ShowGroup($id: ID!) { groupMembersById(id: $id) { deviceId name version userAgent } }";

const REMOVE_GROUP: &str = "mutation RemoveGroup($id: ID!) { removeGroup(id: $id) { success } }";

const KICK_DEVICE: &str = "mutation KickDevice($groupId: ID!, $deviceId: ID!) { kickDevice(groupId: $groupId, deviceId: $deviceId) { success } }";

/// Authenticated dashboard operations, each with its GraphQL document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOp {
    ListGroups,
    ShowGroup { id: String },
    RemoveGroup { id: String },
    KickDevice { group_id: String, device_id: String },
}

impl AccountOp {
    pub fn document(&self) -> &'static str {
        match self {
            AccountOp::ListGroups => LIST_GROUPS,
            AccountOp::ShowGroup { .. } => SHOW_GROUP,
            AccountOp::RemoveGroup { .. } => REMOVE_GROUP,
            AccountOp::KickDevice { .. } => KICK_DEVICE,
        }
    }

    pub fn variables(&self) -> Value {
        match self {
            AccountOp::ListGroups => json!({}),
            AccountOp::ShowGroup { id } | AccountOp::RemoveGroup { id } => json!({ "id": id }),
            AccountOp::KickDevice {
                group_id,
                device_id,
            } => json!({ "groupId": group_id, "deviceId": device_id }),
        }
    }

    pub fn render(&self, data: &Value) -> String {
        match self {
            AccountOp::ListGroups => {
                let rows = rows_of(&data["groups"], &["id", "name", "deviceCount"]);
                table(&["ID", "Name", "Devices"], &rows)
            }
            AccountOp::ShowGroup { .. } => {
                let rows = rows_of(
                    &data["groupMembersById"],
                    &["deviceId", "name", "version", "userAgent"],
                );
                table(&["ID(ipv6)", "Name", "Version", "UserAgent"], &rows)
            }
            AccountOp::RemoveGroup { .. } => "Group removed successfully.".to_string(),
            AccountOp::KickDevice { .. } => {
                "Device was successfully removed from the group.".to_string()
            }
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn rows_of(list: &Value, keys: &[&str]) -> Vec<Vec<String>> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| keys.iter().map(|k| cell(&item[*k])).collect())
                .collect()
        })
        .unwrap_or_default()
}

/// Run `op` through the session and render its result.
pub async fn run<S, A, P>(session: &AuthSession<S, A, P>, op: &AccountOp) -> Result<String, AuthError>
where
    S: TokenStore,
    A: AuthApi,
    P: CredentialPrompt,
{
    let api = session.api();
    let data = session
        .call(|token| async move { api.query(&token, op.document(), op.variables()).await })
        .await?;
    Ok(op.render(&data))
}
