use async_trait::async_trait;
use serde_json::Value;

use crate::types::{MinionInfo, MinionJob, Submission};
use crate::Result;

/// The slice of the Salt master API the provisioner needs.
///
/// Implementations must be safe to share between concurrent provisioning
/// runs; [`crate::SaltApi`] keeps its session token behind a lock for that
/// reason.
#[async_trait]
pub trait SaltClient: Send + Sync {
    /// Establish a session. Bad credentials surface as
    /// [`crate::ConvergeError::Auth`].
    async fn login(&self) -> Result<()>;

    /// Look up a minion by id.
    ///
    /// A minion the master has never heard of may be reported either as
    /// `Ok(None)` or as [`crate::ConvergeError::MinionNotFound`]; callers
    /// treat the two the same.
    async fn minion(&self, id: &str) -> Result<Option<MinionInfo>>;

    /// Submit a job. Depending on the client mode this returns a job id to
    /// poll or the finished result.
    async fn submit_job(&self, job: &MinionJob) -> Result<Submission>;

    /// Fetch the result of an async job. `Ok(None)` means the master has no
    /// data for it yet.
    async fn lookup_job(&self, jid: &str) -> Result<Option<Value>>;
}
