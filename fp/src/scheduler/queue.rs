//! Per-session queues and the round-robin ring over them

use std::collections::{HashMap, VecDeque};

use tracing::debug;

/// One FIFO queue per session plus a ring of session ids with a cursor.
///
/// Invariants: every id in `order` has a non-empty queue in `queues` and
/// vice versa; `cursor < order.len()` unless the ring is empty.
#[derive(Debug)]
pub struct SessionQueues<J> {
    queues: HashMap<String, VecDeque<J>>,
    order: Vec<String>,
    cursor: usize,
}

impl<J> Default for SessionQueues<J> {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
            order: Vec::new(),
            cursor: 0,
        }
    }
}

impl<J> SessionQueues<J> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail of its session's queue
    pub fn push_back(&mut self, session_id: &str, job: J) {
        self.queue_mut(session_id).push_back(job);
    }

    /// Requeue a retried job behind the retries already waiting in its
    /// session and ahead of everything that has not run yet
    pub fn push_retry(&mut self, session_id: &str, job: J, is_retry: impl Fn(&J) -> bool) {
        let queue = self.queue_mut(session_id);
        let position = queue.iter().position(|queued| !is_retry(queued)).unwrap_or(queue.len());
        queue.insert(position, job);
    }

    fn queue_mut(&mut self, session_id: &str) -> &mut VecDeque<J> {
        if !self.queues.contains_key(session_id) {
            debug!(%session_id, "SessionQueues: new session");
            self.order.push(session_id.to_string());
        }
        self.queues.entry(session_id.to_string()).or_default()
    }

    /// Drop empty and cancelled sessions from the ring, returning the jobs
    /// that were still queued for cancelled sessions.
    pub fn cleanup(&mut self, is_cancelled: impl Fn(&str) -> bool) -> Vec<J> {
        let mut purged = Vec::new();
        let mut index = 0;
        while index < self.order.len() {
            let session_id = &self.order[index];
            let empty = self.queues.get(session_id).is_none_or(|q| q.is_empty());
            if empty || is_cancelled(session_id) {
                let session_id = self.order.remove(index);
                if index < self.cursor {
                    self.cursor -= 1;
                }
                if let Some(queue) = self.queues.remove(&session_id) {
                    purged.extend(queue);
                }
            } else {
                index += 1;
            }
        }
        self.clamp_cursor();
        purged
    }

    /// Pop the next job in round-robin order.
    ///
    /// Scans from the cursor; empty sessions are dropped and cancelled
    /// sessions are drained into `purged`. The cursor moves past the session
    /// that was served, so each session yields at most one job per cycle.
    pub fn pop_next(&mut self, is_cancelled: impl Fn(&str) -> bool, purged: &mut Vec<J>) -> Option<(String, J)> {
        while !self.order.is_empty() {
            self.clamp_cursor();
            let index = self.cursor;
            let session_id = self.order[index].clone();

            if is_cancelled(&session_id) {
                debug!(%session_id, "SessionQueues::pop_next: dropping cancelled session");
                self.order.remove(index);
                if let Some(queue) = self.queues.remove(&session_id) {
                    purged.extend(queue);
                }
                continue;
            }

            let job = self.queues.get_mut(&session_id).and_then(|q| q.pop_front());
            let Some(job) = job else {
                self.order.remove(index);
                self.queues.remove(&session_id);
                continue;
            };

            if self.queues.get(&session_id).is_none_or(|q| q.is_empty()) {
                // Removing the served session leaves the cursor on its successor
                self.order.remove(index);
                self.queues.remove(&session_id);
            } else {
                self.cursor = index + 1;
            }
            self.clamp_cursor();
            return Some((session_id, job));
        }
        self.cursor = 0;
        None
    }

    /// Remove a session entirely, returning its queued jobs
    pub fn remove_session(&mut self, session_id: &str) -> Vec<J> {
        let Some(position) = self.order.iter().position(|id| id == session_id) else {
            return self.queues.remove(session_id).map(Vec::from).unwrap_or_default();
        };
        self.order.remove(position);
        if position < self.cursor {
            self.cursor -= 1;
        }
        self.clamp_cursor();
        self.queues.remove(session_id).map(Vec::from).unwrap_or_default()
    }

    /// Drain every queue
    pub fn drain_all(&mut self) -> Vec<J> {
        self.order.clear();
        self.cursor = 0;
        self.queues.drain().flat_map(|(_, q)| q).collect()
    }

    /// Total queued jobs across all sessions
    pub fn len(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(|q| q.is_empty())
    }

    /// Sessions currently in the ring
    pub fn session_count(&self) -> usize {
        self.order.len()
    }

    /// Jobs queued for one session
    pub fn queued_for(&self, session_id: &str) -> usize {
        self.queues.get(session_id).map_or(0, |q| q.len())
    }

    /// How many sessions will be served before this one
    pub fn sessions_ahead_of(&self, session_id: &str) -> Option<usize> {
        let position = self.order.iter().position(|id| id == session_id)?;
        let len = self.order.len();
        Some((position + len - self.cursor % len) % len)
    }

    /// Session ids in ring order, starting at the cursor
    #[cfg(test)]
    fn ring(&self) -> Vec<&str> {
        let len = self.order.len();
        (0..len)
            .map(|i| self.order[(self.cursor + i) % len].as_str())
            .collect()
    }

    fn clamp_cursor(&mut self) {
        if self.order.is_empty() || self.cursor >= self.order.len() {
            self.cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn never(_: &str) -> bool {
        false
    }

    fn drain(queues: &mut SessionQueues<u32>) -> Vec<(String, u32)> {
        let mut purged = Vec::new();
        std::iter::from_fn(|| queues.pop_next(never, &mut purged)).collect()
    }

    #[test]
    fn test_fifo_within_session() {
        let mut queues = SessionQueues::new();
        queues.push_back("a", 1);
        queues.push_back("a", 2);
        queues.push_back("a", 3);

        let served: Vec<u32> = drain(&mut queues).into_iter().map(|(_, j)| j).collect();
        assert_eq!(served, vec![1, 2, 3]);
        assert!(queues.is_empty());
        assert_eq!(queues.session_count(), 0);
    }

    #[test]
    fn test_round_robin_across_sessions() {
        let mut queues = SessionQueues::new();
        for job in 0..3 {
            queues.push_back("a", job);
        }
        queues.push_back("b", 10);
        queues.push_back("c", 20);
        queues.push_back("c", 21);

        let order: Vec<String> = drain(&mut queues).into_iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec!["a", "b", "c", "a", "c", "a"]);
    }

    /// Jobs numbered 100 and up stand for retries
    fn is_retry(job: &u32) -> bool {
        *job >= 100
    }

    #[test]
    fn test_push_retry_goes_ahead_of_fresh_work() {
        let mut queues = SessionQueues::new();
        queues.push_back("a", 1);
        queues.push_back("a", 2);
        queues.push_retry("a", 100, is_retry);

        let served: Vec<u32> = drain(&mut queues).into_iter().map(|(_, j)| j).collect();
        assert_eq!(served, vec![100, 1, 2]);
    }

    #[test]
    fn test_push_retry_keeps_retry_order() {
        let mut queues = SessionQueues::new();
        queues.push_back("a", 1);
        queues.push_retry("a", 100, is_retry);
        queues.push_retry("a", 101, is_retry);
        queues.push_retry("b", 102, is_retry);

        let served: Vec<(String, u32)> = drain(&mut queues);
        let a: Vec<u32> = served.iter().filter(|(s, _)| s == "a").map(|(_, j)| *j).collect();
        assert_eq!(a, vec![100, 101, 1]);
        assert_eq!(served.len(), 4);
    }

    #[test]
    fn test_cleanup_purges_cancelled_sessions() {
        let mut queues = SessionQueues::new();
        queues.push_back("a", 1);
        queues.push_back("b", 2);
        queues.push_back("b", 3);
        queues.push_back("c", 4);

        let purged = queues.cleanup(|s| s == "b");
        assert_eq!(purged, vec![2, 3]);
        assert_eq!(queues.session_count(), 2);
        assert_eq!(queues.len(), 2);

        let order: Vec<String> = drain(&mut queues).into_iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec!["a", "c"]);
    }

    #[test]
    fn test_cleanup_keeps_cursor_on_same_session() {
        let mut queues = SessionQueues::new();
        queues.push_back("a", 1);
        queues.push_back("a", 2);
        queues.push_back("b", 3);
        queues.push_back("b", 4);
        queues.push_back("c", 5);
        queues.push_back("c", 6);

        let mut purged = Vec::new();
        // Serve "a" and "b"; cursor now points at "c"
        queues.pop_next(never, &mut purged);
        queues.pop_next(never, &mut purged);
        assert_eq!(queues.ring()[0], "c");

        queues.cleanup(|s| s == "a");
        assert_eq!(queues.ring()[0], "c");
    }

    #[test]
    fn test_pop_next_drains_cancelled_sessions() {
        let mut queues = SessionQueues::new();
        queues.push_back("a", 1);
        queues.push_back("b", 2);

        let mut purged = Vec::new();
        let next = queues.pop_next(|s| s == "a", &mut purged);
        assert_eq!(next, Some(("b".to_string(), 2)));
        assert_eq!(purged, vec![1]);
        assert!(queues.is_empty());
    }

    #[test]
    fn test_remove_session() {
        let mut queues = SessionQueues::new();
        queues.push_back("a", 1);
        queues.push_back("b", 2);
        queues.push_back("b", 3);

        assert_eq!(queues.remove_session("b"), vec![2, 3]);
        assert!(queues.remove_session("missing").is_empty());
        assert_eq!(queues.session_count(), 1);
        assert_eq!(queues.queued_for("b"), 0);
    }

    #[test]
    fn test_sessions_ahead_of() {
        let mut queues = SessionQueues::new();
        queues.push_back("a", 1);
        queues.push_back("a", 2);
        queues.push_back("b", 3);
        queues.push_back("b", 4);
        queues.push_back("c", 5);
        queues.push_back("c", 6);

        assert_eq!(queues.sessions_ahead_of("a"), Some(0));
        assert_eq!(queues.sessions_ahead_of("c"), Some(2));
        assert_eq!(queues.sessions_ahead_of("zzz"), None);

        let mut purged = Vec::new();
        queues.pop_next(never, &mut purged);
        assert_eq!(queues.sessions_ahead_of("b"), Some(0));
        assert_eq!(queues.sessions_ahead_of("a"), Some(2));
    }

    proptest! {
        /// No session is served twice before every other non-empty session
        /// has been served once.
        #[test]
        fn prop_round_robin_fairness(counts in proptest::collection::vec(1usize..6, 1..8)) {
            let mut queues = SessionQueues::new();
            for (session, count) in counts.iter().enumerate() {
                for job in 0..*count {
                    queues.push_back(&format!("s{}", session), job as u32);
                }
            }

            let mut remaining: Vec<usize> = counts.clone();
            let mut served_this_round: HashSet<String> = HashSet::new();
            let mut purged = Vec::new();
            while let Some((session, _)) = queues.pop_next(never, &mut purged) {
                let eligible: HashSet<String> = remaining
                    .iter()
                    .enumerate()
                    .filter(|(_, n)| **n > 0)
                    .map(|(i, _)| format!("s{}", i))
                    .collect();
                if served_this_round.is_superset(&eligible) {
                    served_this_round.clear();
                }
                prop_assert!(served_this_round.insert(session.clone()), "{} served twice in a round", session);
                let index: usize = session[1..].parse().unwrap();
                remaining[index] -= 1;
            }
            prop_assert!(remaining.iter().all(|n| *n == 0));
            prop_assert!(purged.is_empty());
        }
    }
}
