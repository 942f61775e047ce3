//! Mitigation shell-outs: packet-filter drop rules and traffic-shaper rate
//! limits for confirmed suspect addresses.
//!
//! Both operations are idempotent: an in-process applied-set short-circuits
//! repeat calls and the packet filter is probed (`iptables -C`) before a
//! rule is appended. These commands require an effective uid of 0; callers
//! check [`has_privileges`] and degrade to detection-only when it fails.

use std::collections::HashSet;
use std::process::Command;

use thiserror::Error;

use crate::suspects::SuspectList;

#[derive(Debug, Error)]
pub enum MitigationError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        source: std::io::Error,
    },
    #[error("{command} exited with {status} for {addr}")]
    Failed {
        command: &'static str,
        status: String,
        addr: String,
    },
}

/// Whether the process runs with root privileges.
pub fn has_privileges() -> bool {
    Command::new("id")
        .arg("-u")
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).trim() == "0")
        .unwrap_or(false)
}

/// Applies drop rules and rate limits, tracking what has been applied.
pub struct MitigationEngine {
    interface: String,
    rate_limit: String,
    rate_burst: String,
    blocked: HashSet<String>,
    rate_limited: HashSet<String>,
    qdisc_ready: bool,
    /// Log intended commands instead of executing them.
    dry_run: bool,
}

impl MitigationEngine {
    pub fn new(interface: &str, rate_limit: &str, rate_burst: &str) -> Self {
        MitigationEngine {
            interface: interface.to_string(),
            rate_limit: rate_limit.to_string(),
            rate_burst: rate_burst.to_string(),
            blocked: HashSet::new(),
            rate_limited: HashSet::new(),
            qdisc_ready: false,
            dry_run: false,
        }
    }

    /// Builds an engine that only records what it would do (tests, audits).
    pub fn dry_run(interface: &str, rate_limit: &str, rate_burst: &str) -> Self {
        MitigationEngine {
            dry_run: true,
            ..MitigationEngine::new(interface, rate_limit, rate_burst)
        }
    }

    /// Mitigates every suspect whose count reaches `min_count`; returns how
    /// many addresses were processed. Per-address failures are logged and
    /// do not stop the sweep.
    pub fn apply(&mut self, suspects: &SuspectList, min_count: u32) -> usize {
        let mut processed = 0usize;
        for entry in suspects.filtered(min_count) {
            log::info!(
                "mitigating {} (detected in {} windows)",
                entry.addr,
                entry.count
            );
            if let Err(err) = self.block_addr(&entry.addr) {
                log::warn!("drop rule for {} failed: {err}", entry.addr);
            }
            if let Err(err) = self.rate_limit_addr(&entry.addr) {
                log::warn!("rate limit for {} failed: {err}", entry.addr);
            }
            processed += 1;
        }
        processed
    }

    /// Installs a drop rule for `addr`; repeat calls are no-ops.
    pub fn block_addr(&mut self, addr: &str) -> Result<(), MitigationError> {
        if addr.is_empty() || self.blocked.contains(addr) {
            return Ok(());
        }
        let probe = self.run(
            "iptables",
            &["-C", "INPUT", "-s", addr, "-j", "DROP"],
        )?;
        if !probe {
            let added = self.run(
                "iptables",
                &["-A", "INPUT", "-s", addr, "-j", "DROP"],
            )?;
            if !added {
                return Err(MitigationError::Failed {
                    command: "iptables",
                    status: "non-zero".to_string(),
                    addr: addr.to_string(),
                });
            }
        }
        self.blocked.insert(addr.to_string());
        Ok(())
    }

    /// Attaches an ingress police filter for `addr`; repeat calls are
    /// no-ops. The ingress qdisc is created once per engine.
    pub fn rate_limit_addr(&mut self, addr: &str) -> Result<(), MitigationError> {
        if addr.is_empty() || self.rate_limited.contains(addr) {
            return Ok(());
        }
        self.ensure_ingress_qdisc()?;
        let source = format!("{addr}/32");
        // A failed add usually means the filter already exists; either way
        // the address is considered handled, matching the shaper's
        // tolerant behaviour.
        let _ = self.run(
            "tc",
            &[
                "filter", "add", "dev", &self.interface, "parent", "ffff:", "protocol", "ip",
                "prio", "1", "u32", "match", "ip", "src", &source, "police", "rate",
                &self.rate_limit, "burst", &self.rate_burst, "drop", "flowid", ":1",
            ],
        )?;
        self.rate_limited.insert(addr.to_string());
        Ok(())
    }

    fn ensure_ingress_qdisc(&mut self) -> Result<(), MitigationError> {
        if self.qdisc_ready {
            return Ok(());
        }
        let exists = if self.dry_run {
            false
        } else {
            Command::new("tc")
                .args(["qdisc", "show", "dev", &self.interface])
                .output()
                .map(|output| String::from_utf8_lossy(&output.stdout).contains("ingress"))
                .unwrap_or(false)
        };
        if !exists {
            let created = self.run(
                "tc",
                &["qdisc", "add", "dev", &self.interface, "handle", "ffff:", "ingress"],
            )?;
            if !created && !self.dry_run {
                log::warn!("could not create ingress qdisc on {}", self.interface);
            }
        }
        self.qdisc_ready = true;
        Ok(())
    }

    fn run(&self, command: &'static str, args: &[&str]) -> Result<bool, MitigationError> {
        if self.dry_run {
            log::debug!("dry-run: {command} {}", args.join(" "));
            return Ok(true);
        }
        let status = Command::new(command)
            .args(args)
            .output()
            .map_err(|source| MitigationError::Spawn { command, source })?;
        Ok(status.status.success())
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::MitigationEngine;
    use crate::suspects::SuspectList;

    #[test]
    fn repeat_blocks_are_noops() {
        let mut engine = MitigationEngine::dry_run("eth0", "10mbit", "100k");
        engine.block_addr("1.2.3.4").expect("block");
        engine.block_addr("1.2.3.4").expect("block again");
        assert_eq!(engine.blocked_count(), 1);
    }

    #[test]
    fn empty_addr_is_ignored() {
        let mut engine = MitigationEngine::dry_run("eth0", "10mbit", "100k");
        engine.block_addr("").expect("no-op");
        assert_eq!(engine.blocked_count(), 0);
    }

    #[test]
    fn apply_filters_below_min_count() {
        let mut suspects = SuspectList::new();
        suspects.add_with_count("9.9.9.9", 6);
        suspects.add_with_count("1.1.1.1", 2);

        let mut engine = MitigationEngine::dry_run("eth0", "10mbit", "100k");
        assert_eq!(engine.apply(&suspects, 5), 1);
        assert_eq!(engine.blocked_count(), 1);

        // Applying the same list again changes nothing.
        assert_eq!(engine.apply(&suspects, 5), 1);
        assert_eq!(engine.blocked_count(), 1);
    }
}
