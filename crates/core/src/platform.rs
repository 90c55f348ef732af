use std::fmt;

use crate::task::{Task, TaskExtra};

/// Native runtime the transfer engine is linked against. Selected once at
/// client construction; everything platform-specific hangs off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn merge_policy(self) -> MergePolicy {
        match self {
            Self::Ios => MergePolicy::StateCollapse,
            Self::Android => MergePolicy::ByteGated,
        }
    }

    /// The subset of a native event's task fields that feeds the merge. iOS
    /// engines report state alongside byte counters; Android engines only
    /// report bytes.
    pub fn event_fields(self, task: &Task) -> TaskExtra {
        match self {
            Self::Ios => TaskExtra {
                state: task.state.clone(),
                bytes: task.bytes,
                total_bytes: task.total_bytes,
                ..TaskExtra::default()
            },
            Self::Android => TaskExtra {
                bytes: task.bytes,
                ..TaskExtra::default()
            },
        }
    }

    /// Whether freshly seeded metadata captures the native task's initial
    /// state.
    pub fn seeds_state(self) -> bool {
        matches!(self, Self::Ios)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ios => "ios",
            Self::Android => "android",
        })
    }
}

/// How an incoming event combines with the stored record for the same task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// iOS engines emit both byte updates and bare state transitions. Once a
    /// record carries a nonzero byte count, a byte-less event only moves the
    /// state forward so a terminal transition cannot clobber progress detail.
    StateCollapse,
    /// Android engines only emit byte updates as real progress; events without
    /// a byte count are noise and leave the record untouched.
    ByteGated,
}

impl MergePolicy {
    pub fn merge(self, stored: Option<&TaskExtra>, incoming: TaskExtra, is_new: bool) -> TaskExtra {
        let stored = match stored {
            Some(stored) if !is_new => stored,
            _ => return incoming,
        };
        // A zero byte count means "no real progress reported", same as no
        // byte count at all.
        let incoming_has_bytes = incoming.bytes.is_some_and(|b| b > 0);
        match self {
            Self::StateCollapse => {
                if stored.bytes.is_some_and(|b| b > 0) && !incoming_has_bytes {
                    TaskExtra {
                        state: incoming.state,
                        ..stored.clone()
                    }
                } else {
                    stored.merged_with(&incoming)
                }
            }
            Self::ByteGated => {
                if incoming_has_bytes {
                    stored.merged_with(&incoming)
                } else {
                    stored.clone()
                }
            }
        }
    }
}
