//! Member export: list a source group's participants through one account and
//! filter them into an invitation target list.

use chrono::Utc;
use provider::{ExportFilters, ProviderError, TargetId};
use tracing::info;

use crate::campaign::Controller;
use crate::error::{Error, Result};

impl Controller {
    /// Export members of `group` as seen by `account`, filtered.
    ///
    /// Works for any provisioned account regardless of cooldown; listing is
    /// not an invitation and is not rate limited the same way.
    pub async fn export_members(
        &self,
        account: &str,
        group: &str,
        filters: &ExportFilters,
    ) -> Result<Vec<TargetId>> {
        let group = group.trim();
        if group.is_empty() {
            return Err(Error::Invalid("group must not be empty".into()));
        }
        self.account(account).await?;

        self.connector
            .connect(account)
            .await
            .map_err(ProviderError::from)?;
        let participants = self.provider.list_participants(account, group).await?;
        let targets = filters.export(&participants, Utc::now().timestamp());
        info!(
            account,
            group,
            listed = participants.len(),
            exported = targets.len(),
            "members exported"
        );
        Ok(targets)
    }
}
