//! Single-flight call coalescing.
//!
//! While a call for a key is running, further calls for the same key wait
//! for it and receive a clone of its result instead of running again.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

enum State<V> {
    Running,
    /// `None` if the leader unwound without a result.
    Done(Option<V>),
}

struct Call<V> {
    state: Mutex<State<V>>,
    done: Condvar,
}

/// Coalesces concurrent calls that share a key.
pub struct SingleFlight<K, V> {
    calls: Mutex<HashMap<K, Arc<Call<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty group.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of calls in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Runs `f` unless a call for `key` is already in flight, in which case
    /// waits for that call and returns its value.
    ///
    /// The flag is `true` when the value came from another caller.
    pub fn run<F>(&self, key: K, f: F) -> (V, bool)
    where
        F: FnOnce() -> V,
    {
        let (call, leader) = {
            let mut calls = self.calls.lock();
            match calls.get(&key).cloned() {
                Some(call) => (call, false),
                None => {
                    let call = Arc::new(Call {
                        state: Mutex::new(State::Running),
                        done: Condvar::new(),
                    });
                    calls.insert(key.clone(), Arc::clone(&call));
                    (call, true)
                }
            }
        };

        if leader {
            return (self.lead(key, call, f), false);
        }

        {
            let mut state = call.state.lock();
            while matches!(*state, State::Running) {
                call.done.wait(&mut state);
            }
            if let State::Done(Some(value)) = &*state {
                return (value.clone(), true);
            }
        }

        // The leader panicked; run on our own.
        (f(), false)
    }

    fn lead<F>(&self, key: K, call: Arc<Call<V>>, f: F) -> V
    where
        F: FnOnce() -> V,
    {
        let guard = Finish {
            group: self,
            key,
            call,
        };
        let value = f();
        *guard.call.state.lock() = State::Done(Some(value.clone()));
        value
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the key and wakes waiters, also when the leader unwinds.
struct Finish<'a, K: Eq + Hash, V> {
    group: &'a SingleFlight<K, V>,
    key: K,
    call: Arc<Call<V>>,
}

impl<K: Eq + Hash, V> Drop for Finish<'_, K, V> {
    fn drop(&mut self) {
        self.group.calls.lock().remove(&self.key);
        let mut state = self.call.state.lock();
        if matches!(*state, State::Running) {
            *state = State::Done(None);
        }
        self.call.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn sequential_calls_each_run() {
        let group: SingleFlight<&str, u32> = SingleFlight::new();
        assert_eq!(group.run("a", || 1), (1, false));
        assert_eq!(group.run("a", || 2), (2, false));
        assert_eq!(group.in_flight(), 0);
    }

    #[test]
    fn concurrent_calls_coalesce() {
        let group = Arc::new(SingleFlight::<u8, usize>::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let group = Arc::clone(&group);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    group.run(0, || {
                        thread::sleep(Duration::from_millis(200));
                        runs.fetch_add(1, Ordering::SeqCst) + 1
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|(v, _)| *v == 1));
        assert_eq!(results.iter().filter(|(_, shared)| !*shared).count(), 1);
    }

    #[test]
    fn different_keys_do_not_coalesce() {
        let group = Arc::new(SingleFlight::<u8, u8>::new());
        let other = Arc::clone(&group);
        let handle = thread::spawn(move || other.run(1, || 1));
        assert_eq!(group.run(2, || 2), (2, false));
        assert_eq!(handle.join().unwrap(), (1, false));
    }

    #[test]
    fn leader_panic_releases_waiters() {
        let group = Arc::new(SingleFlight::<u8, u8>::new());
        let leader = Arc::clone(&group);
        let handle = thread::spawn(move || {
            leader.run(0, || {
                thread::sleep(Duration::from_millis(100));
                panic!("leader failed");
            })
        });

        thread::sleep(Duration::from_millis(20));
        let (value, _) = group.run(0, || 9);
        assert_eq!(value, 9);
        assert!(handle.join().is_err());
        assert_eq!(group.in_flight(), 0);
    }
}
