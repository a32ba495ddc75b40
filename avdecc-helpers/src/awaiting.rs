use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// How long to wait for a response, and how many times to resend before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u8,
}

impl RetryPolicy {
    pub const fn new(timeout: Duration, max_retries: u8) -> Self {
        Self {
            timeout,
            max_retries,
        }
    }
}

/// A command awaiting its response.
#[derive(Debug)]
pub struct Entry<Command, Waiter> {
    /// Retained so that it can be resent unchanged.
    pub command: Command,
    pub waiter: Waiter,
    pub retries: u8,
    pub policy: RetryPolicy,
    pub deadline: Instant,
}

#[derive(Debug)]
pub enum Expired<Id, Command, Waiter> {
    /// Resend `command`. The entry stays registered with a fresh deadline.
    Retry { id: Id, command: Command },
    /// No retries left. The entry has been removed.
    Exhausted { id: Id, entry: Entry<Command, Waiter> },
}

/// Maintains a mapping from request IDs to the commands awaiting a response.
///
/// Owned by a single task, which drives the deadlines by calling `expire` whenever
/// `next_deadline` has passed.
pub struct Awaiting<Id, Command, Waiter> {
    map: HashMap<Id, Entry<Command, Waiter>>,
}

impl<Id, Command, Waiter> Awaiting<Id, Command, Waiter>
where
    Id: Clone + Eq + Hash,
    Command: Clone,
{
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.map.contains_key(id)
    }

    pub fn get(&self, id: &Id) -> Option<&Entry<Command, Waiter>> {
        self.map.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Entry<Command, Waiter>)> {
        self.map.iter()
    }

    /// Registers a command sent at `now`. If `id` is already awaiting a response, nothing is
    /// replaced and the command and waiter are handed back.
    pub fn register(
        &mut self,
        id: Id,
        command: Command,
        waiter: Waiter,
        policy: RetryPolicy,
        now: Instant,
    ) -> Result<(), (Command, Waiter)> {
        if self.map.contains_key(&id) {
            return Err((command, waiter));
        }

        self.map.insert(
            id,
            Entry {
                command,
                waiter,
                retries: 0,
                policy,
                deadline: now + policy.timeout,
            },
        );
        Ok(())
    }

    pub fn deregister(&mut self, id: &Id) -> Option<Entry<Command, Waiter>> {
        self.map.remove(id)
    }

    /// Restarts the timer of a command without consuming a retry.
    pub fn restart_timer(&mut self, id: &Id, now: Instant) -> bool {
        match self.map.get_mut(id) {
            Some(entry) => {
                entry.deadline = now + entry.policy.timeout;
                true
            }
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.map.values().map(|entry| entry.deadline).min()
    }

    /// Processes every entry whose deadline is at or before `now`, oldest deadline first.
    pub fn expire(&mut self, now: Instant) -> Vec<Expired<Id, Command, Waiter>> {
        let mut due: Vec<(Instant, Id)> = self
            .map
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, entry)| (entry.deadline, id.clone()))
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);

        let mut expired = Vec::with_capacity(due.len());
        for (_, id) in due {
            let retry = match self.map.get_mut(&id) {
                Some(entry) if entry.retries < entry.policy.max_retries => {
                    entry.retries += 1;
                    entry.deadline = now + entry.policy.timeout;
                    Some(entry.command.clone())
                }
                Some(_) => None,
                None => continue,
            };

            match retry {
                Some(command) => expired.push(Expired::Retry { id, command }),
                None => {
                    if let Some(entry) = self.map.remove(&id) {
                        expired.push(Expired::Exhausted { id, entry });
                    }
                }
            }
        }
        expired
    }

    /// Removes and returns every entry matching `predicate`.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<(Id, Entry<Command, Waiter>)>
    where
        F: FnMut(&Id, &Entry<Command, Waiter>) -> bool,
    {
        let ids: Vec<Id> = self
            .map
            .iter()
            .filter(|(id, entry)| predicate(id, entry))
            .map(|(id, _)| id.clone())
            .collect();

        ids.into_iter()
            .filter_map(|id| self.map.remove(&id).map(|entry| (id, entry)))
            .collect()
    }

    pub fn drain(&mut self) -> Vec<(Id, Entry<Command, Waiter>)> {
        self.map.drain().collect()
    }
}

impl<Id, Command, Waiter> Default for Awaiting<Id, Command, Waiter>
where
    Id: Clone + Eq + Hash,
    Command: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: RetryPolicy = RetryPolicy::new(Duration::from_millis(250), 2);

    fn awaiting() -> Awaiting<u16, &'static str, u32> {
        Awaiting::new()
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let now = Instant::now();
        let mut awaiting = awaiting();

        assert!(awaiting.register(1, "first", 10, POLICY, now).is_ok());
        assert_eq!(
            awaiting.register(1, "second", 20, POLICY, now).unwrap_err(),
            ("second", 20)
        );
        assert_eq!(awaiting.get(&1).unwrap().command, "first");
    }

    #[test]
    fn retries_then_exhausts() {
        let start = Instant::now();
        let mut awaiting = awaiting();
        awaiting.register(7, "cmd", 1, POLICY, start).unwrap();

        assert!(awaiting.expire(start + Duration::from_millis(249)).is_empty());

        let mut now = start;
        for attempt in 1..=2 {
            now += POLICY.timeout;
            match awaiting.expire(now).as_slice() {
                [Expired::Retry { id: 7, command: "cmd" }] => {}
                other => panic!("attempt {}: unexpected {:?}", attempt, other),
            }
            assert_eq!(awaiting.get(&7).unwrap().retries, attempt);
        }

        now += POLICY.timeout;
        match awaiting.expire(now).pop() {
            Some(Expired::Exhausted { id: 7, entry }) => assert_eq!(entry.waiter, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(awaiting.is_empty());
        assert_eq!(now - start, POLICY.timeout * 3);
    }

    #[test]
    fn restart_timer_keeps_retry_count() {
        let start = Instant::now();
        let mut awaiting = awaiting();
        awaiting.register(3, "cmd", 0, POLICY, start).unwrap();

        let later = start + Duration::from_millis(200);
        assert!(awaiting.restart_timer(&3, later));
        assert_eq!(awaiting.next_deadline(), Some(later + POLICY.timeout));
        assert_eq!(awaiting.get(&3).unwrap().retries, 0);
        assert!(!awaiting.restart_timer(&4, later));
    }

    #[test]
    fn remove_where_only_takes_matches() {
        let now = Instant::now();
        let mut awaiting = awaiting();
        for id in 0..4 {
            awaiting.register(id, "cmd", u32::from(id), POLICY, now).unwrap();
        }

        let mut removed: Vec<u16> = awaiting
            .remove_where(|_, entry| entry.waiter % 2 == 0)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        removed.sort();

        assert_eq!(removed, vec![0, 2]);
        assert_eq!(awaiting.len(), 2);
    }
}
