//! Replay a JSON-lines stream of inbound events through a [`MessageEngine`]
//! and write one broadcast (or rejection) per event.

use anyhow::{bail, Context, Result};
use missive_core::core_membership::{InMemoryMembership, MemberRole};
use missive_core::core_model::{GroupId, UserId};
use missive_core::{InboundEvent, MessageEngine};
use serde_json::json;
use std::io::Write;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// `group=user,user,...` as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub group: GroupId,
    pub users: Vec<UserId>,
}

impl FromStr for GroupSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, users) = s
            .split_once('=')
            .ok_or_else(|| format!("expected GROUP=USER[,USER...], got '{}'", s))?;
        let group = group.trim();
        if group.is_empty() {
            return Err(format!("missing group name in '{}'", s));
        }
        let users: Vec<UserId> = users
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(UserId::new)
            .collect();
        if users.is_empty() {
            return Err(format!("group '{}' has no users", group));
        }
        Ok(GroupSpec {
            group: GroupId::new(group),
            users,
        })
    }
}

/// Populate membership from `--group`, `--moderator` and `--global-moderator`
pub fn build_membership(
    groups: &[GroupSpec],
    moderators: &[GroupSpec],
    global_moderators: &[String],
) -> InMemoryMembership {
    let membership = InMemoryMembership::new();
    for spec in groups {
        membership.create_group(spec.group.clone());
        for user in &spec.users {
            membership.add_member(&spec.group, user.clone(), MemberRole::Member);
        }
    }
    for spec in moderators {
        for user in &spec.users {
            membership.add_member(&spec.group, user.clone(), MemberRole::Moderator);
        }
    }
    for user in global_moderators {
        membership.add_global_moderator(UserId::new(user.as_str()));
    }
    membership
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Dispatch every event in `input`. Blank lines and `#` comments are
/// skipped; a line that is not a valid event aborts the replay.
///
/// Rejected events are reported on `out` as `{"line", "event", "status",
/// "error"}` objects and, unless `fail_fast` is set, the replay continues.
pub async fn replay<R, W>(
    engine: &MessageEngine,
    input: R,
    out: &mut W,
    fail_fast: bool,
) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut summary = ReplaySummary::default();
    let mut lines = input.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("reading event stream")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: InboundEvent = serde_json::from_str(line)
            .with_context(|| format!("line {}: not a valid event", line_no))?;
        let name = event.name();

        match engine.dispatch(event).await {
            Ok(broadcast) => {
                summary.applied += 1;
                debug!(line = line_no, event = name, "event applied");
                writeln!(out, "{}", serde_json::to_string(&broadcast)?)?;
            }
            Err(err) => {
                summary.rejected += 1;
                warn!(line = line_no, event = name, status = err.status_code(), error = %err, "event rejected");
                let report = json!({
                    "line": line_no,
                    "event": name,
                    "status": err.status_code(),
                    "error": err.to_string(),
                });
                writeln!(out, "{}", report)?;
                if fail_fast {
                    bail!("line {}: {} rejected: {}", line_no, name, err);
                }
            }
        }
    }

    Ok(summary)
}
