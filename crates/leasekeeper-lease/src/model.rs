//! Lease engine data model

use serde::{Deserialize, Serialize};

use leasekeeper_common::{Moment, Tick};

/// Provisioning parameters for one leased resource
///
/// Zero or empty values mean "use the provisioner's host default".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionSpec {
    /// Image to run (default: empty, host default image)
    #[serde(default)]
    pub image: String,

    /// Public key of the tenant that will own the instance
    #[serde(default)]
    pub owner_pubkey: String,

    /// Contract identifier to deploy into the instance
    #[serde(default)]
    pub contract_id: String,

    /// CPU quota in microseconds per period (default: 0, host default)
    #[serde(default)]
    pub cpu_micros: u64,

    /// Memory limit in KB (default: 0, host default)
    #[serde(default)]
    pub memory_kbytes: u64,

    /// Swap limit in KB (default: 0, host default)
    #[serde(default)]
    pub swap_kbytes: u64,

    /// Disk quota in KB (default: 0, host default)
    #[serde(default)]
    pub disk_kbytes: u64,

    /// Outbound IPv6 address to assign (default: none)
    #[serde(default)]
    pub outbound_ipv6: Option<String>,

    /// Network interface for outbound IPv6 traffic (default: none)
    #[serde(default)]
    pub outbound_net_interface: Option<String>,

    /// Free-form contract configuration passed through to the instance
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Resource returned by a successful `create`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedResource {
    pub name: String,
    /// Connection details handed to the tenant
    #[serde(default)]
    pub descriptor: serde_json::Value,
}

/// Incoming request to provision a leased resource
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireRequest {
    pub reference: String,
    pub tenant: String,
    /// Paid duration in moments
    pub duration: u32,
    #[serde(default)]
    pub spec: ProvisionSpec,
    /// Token returned to the tenant when the acquire fails
    #[serde(default)]
    pub compensation_token: Option<String>,
}

/// Event consumed by the lease manager
#[derive(Clone, Debug, PartialEq)]
pub enum LeaseEvent {
    Tick { index: Tick },
    Acquire(AcquireRequest),
}

/// In-memory schedule entry for an acquired lease
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryEntry {
    pub reference: String,
    pub resource_name: String,
    /// Last moment the resource is paid for
    pub expiry_moment: Moment,
}

/// Success notice sent upstream once a lease is acquired
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseSuccess {
    pub reference: String,
    pub tenant: String,
    pub descriptor: serde_json::Value,
}

/// Failure notice sent upstream when an acquire ends without a resource
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseFailure {
    pub reference: String,
    pub tenant: String,
    pub duration: u32,
    pub reason: String,
    #[serde(default)]
    pub compensation_token: Option<String>,
}

impl LeaseFailure {
    pub fn for_request(request: &AcquireRequest, reason: impl Into<String>) -> Self {
        Self {
            reference: request.reference.clone(),
            tenant: request.tenant.clone(),
            duration: request.duration,
            reason: reason.into(),
            compensation_token: request.compensation_token.clone(),
        }
    }
}

/// How one acquire request ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired {
        resource_name: String,
        expiry_moment: Moment,
    },
    /// Budget exceeded; the lease is `SashiTimeout`
    TimedOut { elapsed: u64 },
    /// The lease is `Failed` (or could not be recorded at all)
    Failed { reason: String },
    /// The reference already had a record; nothing was done
    Duplicate,
}

impl AcquireOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AcquireOutcome::Acquired { .. } => "acquired",
            AcquireOutcome::TimedOut { .. } => "timeout",
            AcquireOutcome::Failed { .. } => "failed",
            AcquireOutcome::Duplicate => "duplicate",
        }
    }
}
