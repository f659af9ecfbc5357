//! Subscription Records
//!
//! For every trackable target the graph keeps, per field, the ordered set of
//! effects that read that field during their most recent run. A reverse index
//! from effect to the fields it subscribes to lets an effect drop all of its
//! subscriptions in one go before it re-runs or when it is stopped.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Weak;

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::reactive::{EffectId, Key, TargetId};

/// Subscriber list handed out by [`DepGraph::subscribers`].
pub(crate) type Subscribers = SmallVec<[EffectId; 8]>;

/// Per-target subscription table.
struct TargetDeps {
    /// Dead once the target itself has been dropped.
    alive: Weak<dyn Any + Send + Sync>,

    /// Field -> effects, in subscription order.
    fields: HashMap<Key, IndexSet<EffectId>>,
}

/// The dependency graph: target -> field -> subscribed effects.
#[derive(Default)]
pub(crate) struct DepGraph {
    targets: HashMap<TargetId, TargetDeps>,

    /// Effect -> the (target, field) pairs it is subscribed to.
    effect_deps: HashMap<EffectId, IndexSet<(TargetId, Key)>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `effect` to `target.key`. Returns `true` if this is a new
    /// subscription.
    pub fn subscribe<F>(&mut self, target: TargetId, alive: F, key: Key, effect: EffectId) -> bool
    where
        F: FnOnce() -> Weak<dyn Any + Send + Sync>,
    {
        let deps = self.targets.entry(target).or_insert_with(|| TargetDeps {
            alive: alive(),
            fields: HashMap::new(),
        });

        let inserted = deps.fields.entry(key.clone()).or_default().insert(effect);
        if inserted {
            self.effect_deps
                .entry(effect)
                .or_default()
                .insert((target, key));
        }
        inserted
    }

    /// Effects subscribed to `target.key`, in subscription order.
    pub fn subscribers(&self, target: TargetId, key: &Key) -> Subscribers {
        self.targets
            .get(&target)
            .and_then(|deps| deps.fields.get(key))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, target: TargetId, key: &Key) -> usize {
        self.targets
            .get(&target)
            .and_then(|deps| deps.fields.get(key))
            .map_or(0, IndexSet::len)
    }

    /// Drop every subscription held by `effect`.
    pub fn clear_effect(&mut self, effect: EffectId) {
        let Some(subscriptions) = self.effect_deps.remove(&effect) else {
            return;
        };

        for (target, key) in subscriptions {
            let Some(deps) = self.targets.get_mut(&target) else {
                continue;
            };
            if let Some(set) = deps.fields.get_mut(&key) {
                set.shift_remove(&effect);
                if set.is_empty() {
                    deps.fields.remove(&key);
                }
            }
        }
    }

    /// Drop every record of `target`.
    pub fn remove_target(&mut self, target: TargetId) {
        let Some(deps) = self.targets.remove(&target) else {
            return;
        };

        for (key, effects) in deps.fields {
            for effect in effects {
                if let Some(subscriptions) = self.effect_deps.get_mut(&effect) {
                    subscriptions.shift_remove(&(target, key.clone()));
                }
            }
        }
    }

    /// Remove targets that no longer exist. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let dead: Vec<TargetId> = self
            .targets
            .iter()
            .filter(|(_, deps)| deps.alive.strong_count() == 0 || deps.fields.is_empty())
            .map(|(id, _)| *id)
            .collect();

        for target in &dead {
            self.remove_target(*target);
        }
        self.effect_deps.retain(|_, subscriptions| !subscriptions.is_empty());
        dead.len()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn dependency_count(&self, effect: EffectId) -> usize {
        self.effect_deps.get(&effect).map_or(0, IndexSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn token() -> Arc<dyn Any + Send + Sync> {
        Arc::new(())
    }

    fn weak(token: &Arc<dyn Any + Send + Sync>) -> impl FnOnce() -> Weak<dyn Any + Send + Sync> + '_ {
        move || Arc::downgrade(token)
    }

    #[test]
    fn subscribers_keep_subscription_order() {
        let mut graph = DepGraph::new();
        let alive = token();
        let target = TargetId::new();
        let (a, b, c) = (EffectId::new(), EffectId::new(), EffectId::new());

        graph.subscribe(target, weak(&alive), Key::from("count"), b);
        graph.subscribe(target, weak(&alive), Key::from("count"), a);
        graph.subscribe(target, weak(&alive), Key::from("count"), c);
        // Re-subscribing is a no-op.
        assert!(!graph.subscribe(target, weak(&alive), Key::from("count"), b));

        let subs = graph.subscribers(target, &Key::from("count"));
        assert_eq!(subs.as_slice(), &[b, a, c]);
    }

    #[test]
    fn clearing_an_effect_removes_all_its_subscriptions() {
        let mut graph = DepGraph::new();
        let alive = token();
        let target = TargetId::new();
        let effect = EffectId::new();
        let other = EffectId::new();

        graph.subscribe(target, weak(&alive), Key::from("a"), effect);
        graph.subscribe(target, weak(&alive), Key::from("b"), effect);
        graph.subscribe(target, weak(&alive), Key::from("a"), other);
        assert_eq!(graph.dependency_count(effect), 2);

        graph.clear_effect(effect);

        assert_eq!(graph.dependency_count(effect), 0);
        assert_eq!(graph.subscriber_count(target, &Key::from("b")), 0);
        assert_eq!(
            graph.subscribers(target, &Key::from("a")).as_slice(),
            &[other]
        );
    }

    #[test]
    fn prune_drops_dead_targets() {
        let mut graph = DepGraph::new();
        let kept = token();
        let dropped = token();
        let (t1, t2) = (TargetId::new(), TargetId::new());
        let effect = EffectId::new();

        graph.subscribe(t1, weak(&kept), Key::Length, effect);
        graph.subscribe(t2, weak(&dropped), Key::Length, effect);
        drop(dropped);

        assert_eq!(graph.prune(), 1);
        assert_eq!(graph.target_count(), 1);
        assert_eq!(graph.dependency_count(effect), 1);
    }
}
