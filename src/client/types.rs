//! Types for etcd cluster membership information.
//!
//! These are owned snapshots of what the etcd `MemberList` and `Alarm`
//! RPCs return. Order is always the order etcd reported.

use std::collections::BTreeSet;

/// A voting or learner participant in the etcd consensus group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Member ID, unique and non-zero within the etcd cluster.
    pub id: u64,
    /// Member name. By convention equal to the name of the hosting Node.
    pub name: String,
    /// Whether the member is a non-voting learner.
    pub is_learner: bool,
    /// URLs the member uses to talk to its peers.
    pub peer_urls: Vec<String>,
    /// URLs the member serves clients on.
    pub client_urls: Vec<String>,
}

impl Member {
    /// Create a voting member with no advertised URLs.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_learner: false,
            peer_urls: Vec::new(),
            client_urls: Vec::new(),
        }
    }

    /// Mark this member as a learner.
    pub fn learner(mut self) -> Self {
        self.is_learner = true;
        self
    }
}

impl From<&etcd_client::Member> for Member {
    fn from(member: &etcd_client::Member) -> Self {
        Self {
            id: member.id(),
            name: member.name().to_string(),
            is_learner: member.is_learner(),
            peer_urls: member.peer_urls().to_vec(),
            client_urls: member.client_urls().to_vec(),
        }
    }
}

/// Kind of condition etcd raised against a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlarmType {
    /// Placeholder reported by etcd when no alarm is set.
    None,
    /// The member's backend quota is exhausted.
    NoSpace,
    /// The member detected data corruption.
    Corrupt,
}

impl AlarmType {
    /// Whether this alarm makes the member unhealthy.
    pub fn is_active(&self) -> bool {
        !matches!(self, AlarmType::None)
    }
}

impl std::fmt::Display for AlarmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmType::None => write!(f, "NONE"),
            AlarmType::NoSpace => write!(f, "NOSPACE"),
            AlarmType::Corrupt => write!(f, "CORRUPT"),
        }
    }
}

impl From<etcd_client::AlarmType> for AlarmType {
    fn from(alarm: etcd_client::AlarmType) -> Self {
        match alarm {
            etcd_client::AlarmType::None => AlarmType::None,
            etcd_client::AlarmType::Nospace => AlarmType::NoSpace,
            etcd_client::AlarmType::Corrupt => AlarmType::Corrupt,
        }
    }
}

/// An alarm raised against a single member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alarm {
    /// ID of the member the alarm applies to.
    pub member_id: u64,
    /// Alarm kind.
    pub alarm: AlarmType,
}

impl Alarm {
    pub fn new(member_id: u64, alarm: AlarmType) -> Self {
        Self { member_id, alarm }
    }
}

/// Find the first member whose name matches `name`, in list order.
pub fn member_for_name<'a>(members: &'a [Member], name: &str) -> Option<&'a Member> {
    members.iter().find(|m| m.name == name)
}

/// Active alarms raised against `member_id`, deduplicated and sorted.
pub fn active_alarms_for(alarms: &[Alarm], member_id: u64) -> Vec<AlarmType> {
    alarms
        .iter()
        .filter(|a| a.member_id == member_id && a.alarm.is_active())
        .map(|a| a.alarm)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
