//! Sender banning after repeated invalid submissions.
//!
//! A lookup drops a lapsed ban. Idle strike queues and lapsed bans of senders
//! that never come back are pruned once the tracked set doubles, and on every
//! expiry sweep.

use crate::crypto::Address;
use std::collections::{HashMap, VecDeque};

const MIN_PRUNE_AT: usize = 64;

#[derive(Debug, Clone)]
pub struct BanList {
    threshold: u32,
    window_secs: u64,
    duration_secs: u64,
    strikes: HashMap<Address, VecDeque<u64>>,
    banned_until: HashMap<Address, u64>,
    prune_at: usize,
}

impl BanList {
    pub fn new(threshold: u32, window_secs: u64, duration_secs: u64) -> Self {
        Self {
            threshold,
            window_secs,
            duration_secs,
            strikes: HashMap::new(),
            banned_until: HashMap::new(),
            prune_at: MIN_PRUNE_AT,
        }
    }

    /// Seconds-resolution expiry of the ban on `sender`, if one is active at `now_secs`.
    pub fn banned_until(&mut self, sender: &Address, now_secs: u64) -> Option<u64> {
        match self.banned_until.get(sender).copied() {
            Some(until) if until > now_secs => Some(until),
            Some(_) => {
                self.banned_until.remove(sender);
                None
            }
            None => None,
        }
    }

    pub fn is_banned(&mut self, sender: &Address, now_secs: u64) -> bool {
        self.banned_until(sender, now_secs).is_some()
    }

    /// Records an invalid submission. Returns true when it tips the sender into a ban.
    pub fn record_invalid(&mut self, sender: Address, now_secs: u64) -> bool {
        let window_start = now_secs.saturating_sub(self.window_secs);
        let strikes = self.strikes.entry(sender).or_default();
        while strikes.front().is_some_and(|at| *at < window_start) {
            strikes.pop_front();
        }
        strikes.push_back(now_secs);

        let banned = strikes.len() as u32 >= self.threshold;
        if banned {
            self.strikes.remove(&sender);
            self.banned_until
                .insert(sender, now_secs.saturating_add(self.duration_secs));
        }
        if self.tracked_senders() >= self.prune_at {
            self.prune(now_secs);
            self.prune_at = (self.tracked_senders() * 2).max(MIN_PRUNE_AT);
        }
        banned
    }

    /// Drops strike queues with nothing left inside the window and bans that have lapsed.
    pub fn prune(&mut self, now_secs: u64) {
        let window_start = now_secs.saturating_sub(self.window_secs);
        self.strikes.retain(|_, strikes| {
            while strikes.front().is_some_and(|at| *at < window_start) {
                strikes.pop_front();
            }
            !strikes.is_empty()
        });
        self.banned_until.retain(|_, until| *until > now_secs);
    }

    /// Senders holding either strikes or a ban entry.
    pub fn tracked_senders(&self) -> usize {
        self.strikes.len() + self.banned_until.len()
    }

    pub fn active_bans(&self, now_secs: u64) -> usize {
        self.banned_until
            .values()
            .filter(|until| **until > now_secs)
            .count()
    }
}
