use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ChatTransport, WorkspaceMember};
use crate::db::{User, UserRole, UserStore};
use crate::utils::AppError;

const SLACKBOT_ID: &str = "USLACKBOT";
const SLACKBOT_NAME: &str = "slackbot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    Create {
        user_id: String,
        user_name: String,
        role: UserRole,
    },
    Delete {
        id: i64,
        user_id: String,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RosterSummary {
    pub created: usize,
    pub deleted: usize,
}

/// Changes that bring the local user table in line with the workspace.
/// Existing active users are left untouched, and members already marked
/// deleted are never created.
pub fn reconcile(remote: &[WorkspaceMember], local: &[User]) -> Vec<RosterChange> {
    let local_by_id: HashMap<&str, &User> =
        local.iter().map(|u| (u.user_id.as_str(), u)).collect();

    remote
        .iter()
        .filter(|member| !is_ignored(member))
        .filter_map(|member| match (local_by_id.get(member.id.as_str()), member.deleted) {
            (None, false) => Some(RosterChange::Create {
                user_id: member.id.clone(),
                user_name: member.name.clone(),
                role: role_for(member),
            }),
            (Some(user), true) => Some(RosterChange::Delete {
                id: user.id,
                user_id: user.user_id.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn is_ignored(member: &WorkspaceMember) -> bool {
    member.is_bot || member.id == SLACKBOT_ID || member.name == SLACKBOT_NAME
}

fn role_for(member: &WorkspaceMember) -> UserRole {
    if member.is_admin || member.is_owner || member.is_primary_owner {
        UserRole::Admin
    } else {
        UserRole::Member
    }
}

pub struct RosterSync {
    users: Arc<dyn UserStore>,
    transport: Arc<dyn ChatTransport>,
}

impl RosterSync {
    pub fn new(users: Arc<dyn UserStore>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { users, transport }
    }

    pub async fn sync(&self) -> Result<RosterSummary, AppError> {
        let remote = self.transport.fetch_workspace_members().await?;
        let local = self.users.list_users().await?;
        let changes = reconcile(&remote, &local);
        debug!(
            remote = remote.len(),
            local = local.len(),
            changes = changes.len(),
            "roster reconciled"
        );
        self.apply(changes).await
    }

    pub async fn apply(&self, changes: Vec<RosterChange>) -> Result<RosterSummary, AppError> {
        let mut summary = RosterSummary::default();
        for change in changes {
            match change {
                RosterChange::Create {
                    user_id,
                    user_name,
                    role,
                } => {
                    let user = User::new(user_id, user_name, role);
                    if self.users.create_user(&user).await? {
                        summary.created += 1;
                    } else {
                        warn!(user_id = %user.user_id, "user appeared concurrently, skipping");
                    }
                }
                RosterChange::Delete { id, user_id } => {
                    self.users.delete_user(id).await?;
                    debug!(%user_id, "removed deleted workspace member");
                    summary.deleted += 1;
                }
            }
        }
        info!(
            created = summary.created,
            deleted = summary.deleted,
            "roster sync finished"
        );
        Ok(summary)
    }
}
