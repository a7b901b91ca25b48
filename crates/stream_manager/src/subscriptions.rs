//! Topic subscription manager
//!
//! Keeps the desired set of topic targets and the live subscriptions on the
//! current session apart. Setting a new target set only touches the
//! difference: removed targets are unsubscribed, added ones subscribed, and
//! unchanged ones keep their subscription id.
//!
//! Every live subscription has exactly one route, which binds it to the
//! vehicle the topic was derived for. Messages whose subscription has no
//! route (already unsubscribed, previous session) are dropped by the caller.

use std::collections::{BTreeMap, HashMap};

use broker_client::{BrokerSession, SubscriptionId};
use contracts::{vehicle_topic, VehicleId};
use tracing::{debug, info, warn};

/// One wanted subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Stream-state key the subscription feeds
    pub key: VehicleId,
    pub destination: String,
    /// Cross-check the payload's `vehicleId` against `key`
    pub verify: bool,
}

impl Target {
    /// Per-vehicle topic, payload id verified
    pub fn vehicle(id: VehicleId) -> Self {
        Self {
            destination: vehicle_topic(&id),
            key: id,
            verify: true,
        }
    }

    /// Explicit destination
    pub fn shared(key: VehicleId, destination: impl Into<String>, verify: bool) -> Self {
        Self {
            key,
            destination: destination.into(),
            verify,
        }
    }
}

/// Where a live subscription's messages go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub vehicle_id: VehicleId,
    pub destination: String,
    pub verify: bool,
}

/// Keys affected by a target change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    pub added: Vec<VehicleId>,
    pub removed: Vec<VehicleId>,
    pub unchanged: Vec<VehicleId>,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    desired: BTreeMap<VehicleId, Target>,
    active: HashMap<VehicleId, SubscriptionId>,
    routes: HashMap<SubscriptionId, Route>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the desired target set.
    ///
    /// With a live session the difference is applied immediately; without
    /// one only the desired set changes and `attach` subscribes later.
    /// Duplicate keys collapse to the last target given.
    pub fn set_targets(
        &mut self,
        targets: impl IntoIterator<Item = Target>,
        session: Option<&dyn BrokerSession>,
    ) -> SubscriptionDiff {
        let next: BTreeMap<VehicleId, Target> =
            targets.into_iter().map(|t| (t.key.clone(), t)).collect();

        let mut diff = SubscriptionDiff::default();
        for (key, target) in &self.desired {
            match next.get(key) {
                Some(new) if new == target => diff.unchanged.push(key.clone()),
                _ => diff.removed.push(key.clone()),
            }
        }
        for (key, target) in &next {
            match self.desired.get(key) {
                Some(old) if old == target => {}
                _ => diff.added.push(key.clone()),
            }
        }

        if let Some(session) = session {
            for key in &diff.removed {
                self.unsubscribe_key(key, session);
            }
        } else {
            for key in &diff.removed {
                if let Some(id) = self.active.remove(key) {
                    self.routes.remove(&id);
                }
            }
        }

        self.desired = next;

        if let Some(session) = session {
            for key in &diff.added {
                self.subscribe_key(key, session);
            }
        }

        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            unchanged = diff.unchanged.len(),
            "Subscription targets updated"
        );
        diff
    }

    /// Subscribe every desired target without a live subscription.
    /// Returns the keys that were subscribed.
    pub fn attach(&mut self, session: &dyn BrokerSession) -> Vec<VehicleId> {
        let pending: Vec<VehicleId> = self
            .desired
            .keys()
            .filter(|key| !self.active.contains_key(*key))
            .cloned()
            .collect();

        pending
            .into_iter()
            .filter(|key| self.subscribe_key(key, session))
            .collect()
    }

    /// Forget live subscriptions after the session died; the desired set is kept
    pub fn detach(&mut self) {
        self.active.clear();
        self.routes.clear();
    }

    /// Unsubscribe everything on `session`; the desired set is kept
    pub fn unsubscribe_all(&mut self, session: &dyn BrokerSession) {
        let keys: Vec<VehicleId> = self.active.keys().cloned().collect();
        for key in &keys {
            self.unsubscribe_key(key, session);
        }
        self.detach();
    }

    pub fn route(&self, id: SubscriptionId) -> Option<&Route> {
        self.routes.get(&id)
    }

    pub fn subscription_for(&self, key: &VehicleId) -> Option<SubscriptionId> {
        self.active.get(key).copied()
    }

    /// Desired keys, sorted
    pub fn tracked(&self) -> Vec<VehicleId> {
        self.desired.keys().cloned().collect()
    }

    pub fn is_tracked(&self, key: &VehicleId) -> bool {
        self.desired.contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn subscribe_key(&mut self, key: &VehicleId, session: &dyn BrokerSession) -> bool {
        let Some(target) = self.desired.get(key) else {
            return false;
        };
        match session.subscribe(&target.destination) {
            Ok(id) => {
                info!(
                    vehicle_id = %key,
                    topic = %target.destination,
                    subscription = %id,
                    "Subscribed"
                );
                self.routes.insert(
                    id,
                    Route {
                        vehicle_id: key.clone(),
                        destination: target.destination.clone(),
                        verify: target.verify,
                    },
                );
                self.active.insert(key.clone(), id);
                true
            }
            Err(e) => {
                warn!(
                    vehicle_id = %key,
                    topic = %target.destination,
                    error = %e,
                    "Subscribe failed"
                );
                false
            }
        }
    }

    fn unsubscribe_key(&mut self, key: &VehicleId, session: &dyn BrokerSession) {
        let Some(id) = self.active.remove(key) else {
            return;
        };
        // Route goes first so nothing already queued for `id` is delivered
        let route = self.routes.remove(&id);
        if let Err(e) = session.unsubscribe(id) {
            warn!(vehicle_id = %key, subscription = %id, error = %e, "Unsubscribe failed");
            return;
        }
        info!(
            vehicle_id = %key,
            topic = route.as_ref().map_or("", |r| r.destination.as_str()),
            subscription = %id,
            "Unsubscribed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_client::{Connector, MockBroker, MockOperation, SessionOptions};
    use std::sync::Arc;

    async fn session(broker: &MockBroker) -> Arc<dyn BrokerSession> {
        broker
            .connect("ws://mock/ws", &SessionOptions::default())
            .await
            .unwrap()
            .session
    }

    fn ids(list: &[&str]) -> Vec<Target> {
        list.iter().map(|id| Target::vehicle((*id).into())).collect()
    }

    #[tokio::test]
    async fn test_diff_touches_only_changes() {
        let broker = MockBroker::new();
        let session = session(&broker).await;
        let mut manager = SubscriptionManager::new();

        manager.set_targets(ids(&["A", "B"]), Some(session.as_ref()));
        let b_before = manager.subscription_for(&"B".into());
        broker.clear_operations();

        let diff = manager.set_targets(ids(&["B", "C"]), Some(session.as_ref()));
        assert_eq!(diff.removed, vec![VehicleId::from("A")]);
        assert_eq!(diff.added, vec![VehicleId::from("C")]);
        assert_eq!(diff.unchanged, vec![VehicleId::from("B")]);

        let ops = broker.operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], MockOperation::Unsubscribe { .. }));
        assert!(matches!(
            &ops[1],
            MockOperation::Subscribe { destination, .. } if destination == "/topic/vehicle/C"
        ));
        assert_eq!(manager.subscription_for(&"B".into()), b_before);
        assert_eq!(
            broker.active_destinations(),
            vec!["/topic/vehicle/B", "/topic/vehicle/C"]
        );
    }

    #[tokio::test]
    async fn test_same_set_is_noop() {
        let broker = MockBroker::new();
        let session = session(&broker).await;
        let mut manager = SubscriptionManager::new();

        manager.set_targets(ids(&["A"]), Some(session.as_ref()));
        broker.clear_operations();
        let diff = manager.set_targets(ids(&["A", "A"]), Some(session.as_ref()));
        assert!(diff.is_empty());
        assert!(broker.operations().is_empty());
    }

    #[tokio::test]
    async fn test_offline_targets_attach_later() {
        let broker = MockBroker::new();
        let mut manager = SubscriptionManager::new();

        let diff = manager.set_targets(ids(&["A", "B"]), None);
        assert_eq!(diff.added.len(), 2);
        assert_eq!(manager.active_count(), 0);

        let session = session(&broker).await;
        let attached = manager.attach(session.as_ref());
        assert_eq!(attached, vec![VehicleId::from("A"), VehicleId::from("B")]);
        assert_eq!(manager.active_count(), 2);

        let id = manager.subscription_for(&"A".into()).unwrap();
        let route = manager.route(id).unwrap();
        assert_eq!(route.vehicle_id, "A");
        assert!(route.verify);
    }

    #[tokio::test]
    async fn test_unsubscribe_all_drops_routes() {
        let broker = MockBroker::new();
        let session = session(&broker).await;
        let mut manager = SubscriptionManager::new();

        manager.set_targets(ids(&["A", "B"]), Some(session.as_ref()));
        let id = manager.subscription_for(&"A".into()).unwrap();
        manager.unsubscribe_all(session.as_ref());

        assert!(manager.route(id).is_none());
        assert!(broker.active_subscriptions().is_empty());
        assert_eq!(manager.tracked().len(), 2);
    }

    #[tokio::test]
    async fn test_detach_then_reattach_uses_new_ids() {
        let broker = MockBroker::new();
        let first = session(&broker).await;
        let mut manager = SubscriptionManager::new();
        manager.set_targets(ids(&["A"]), Some(first.as_ref()));

        broker.drop_connection();
        manager.detach();
        assert_eq!(manager.active_count(), 0);

        let second = session(&broker).await;
        assert_eq!(manager.attach(second.as_ref()).len(), 1);
        assert_eq!(broker.active_destinations(), vec!["/topic/vehicle/A"]);
    }

    #[test]
    fn test_shared_target() {
        let target = Target::shared("*".into(), "/topic/vehicles/all", false);
        assert_eq!(target.destination, "/topic/vehicles/all");
        assert!(!target.verify);
    }
}
