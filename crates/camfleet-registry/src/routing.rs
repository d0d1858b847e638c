//! Routing devices to the group client that owns them
//!
//! The registry scopes every device call to a group. A device that was seen
//! in a group's listing is routed there. Otherwise configured name rules
//! pick a group, and anything left goes to the default group.

use std::collections::HashMap;

use camfleet_core::{Device, DeviceId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::{DeviceApi, RegistryError};

/// Substring rules sending devices to one group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupRule {
    pub group_id: u64,
    /// Matched against the device display name
    pub device_names: Vec<String>,
    /// Matched against the installed application's display name
    pub act_names: Vec<String>,
}

impl GroupRule {
    fn matches(&self, device: &Device) -> bool {
        let hit = |needles: &[String], haystack: &str| {
            needles
                .iter()
                .any(|n| !n.is_empty() && haystack.contains(n.as_str()))
        };
        hit(self.device_names.as_slice(), device.name())
            || device
                .act()
                .is_some_and(|act| hit(self.act_names.as_slice(), &act.name))
    }
}

#[derive(Debug, Clone)]
pub struct GroupRouter {
    rules: Vec<GroupRule>,
    default_group: u64,
}

impl GroupRouter {
    pub fn new(default_group: u64, rules: Vec<GroupRule>) -> Self {
        Self {
            rules,
            default_group,
        }
    }

    pub fn default_group(&self) -> u64 {
        self.default_group
    }

    /// Group for `device`; `listed_in` is the group whose listing returned it
    pub fn route(&self, device: &Device, listed_in: Option<u64>) -> u64 {
        if let Some(group) = listed_in {
            return group;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(device))
            .map(|rule| rule.group_id)
            .unwrap_or(self.default_group)
    }
}

/// A device together with the group it was listed in
#[derive(Debug, Clone, Serialize)]
pub struct FleetDevice {
    pub group_id: u64,
    #[serde(flatten)]
    pub device: Device,
}

impl AsRef<Device> for FleetDevice {
    fn as_ref(&self) -> &Device {
        &self.device
    }
}

/// Every configured group client plus the router over them
#[derive(Debug)]
pub struct Fleet<C> {
    clients: HashMap<u64, C>,
    order: Vec<u64>,
    router: GroupRouter,
}

impl<C: DeviceApi> Fleet<C> {
    pub fn new(clients: Vec<C>, router: GroupRouter) -> Result<Self, RegistryError> {
        let order: Vec<u64> = clients.iter().map(|c| c.group_id()).collect();
        let clients: HashMap<u64, C> = clients.into_iter().map(|c| (c.group_id(), c)).collect();
        if clients.len() != order.len() {
            return Err(RegistryError::InvalidArgument(
                "each group may only be configured once".to_string(),
            ));
        }
        if !clients.contains_key(&router.default_group()) {
            return Err(RegistryError::InvalidArgument(format!(
                "default group {} has no credentials",
                router.default_group()
            )));
        }
        Ok(Self {
            clients,
            order,
            router,
        })
    }

    pub fn group_ids(&self) -> &[u64] {
        &self.order
    }

    pub fn router(&self) -> &GroupRouter {
        &self.router
    }

    /// Client for `device`. Falls back to the default group when the routed
    /// group has no credentials configured.
    pub fn client_for(&self, device: &Device, listed_in: Option<u64>) -> &C {
        let group = self.router.route(device, listed_in);
        match self.clients.get(&group) {
            Some(client) => client,
            None => {
                warn!(device = %device.id, group, "No credentials for routed group, using default");
                self.default_client()
            }
        }
    }

    fn default_client(&self) -> &C {
        // `new` guarantees the default group is present
        &self.clients[&self.router.default_group()]
    }

    /// List every group in configuration order
    pub async fn list_all(&self, include_status: bool) -> Result<Vec<FleetDevice>, RegistryError> {
        let mut all = Vec::new();
        for group_id in &self.order {
            let client = &self.clients[group_id];
            let devices = client.list_all_devices(include_status).await?;
            all.extend(devices.into_iter().map(|device| FleetDevice {
                group_id: *group_id,
                device,
            }));
        }
        debug!(groups = self.order.len(), devices = all.len(), "Listed fleet");
        Ok(all)
    }

    /// Look a device up by id across all groups
    pub async fn find(&self, id: &DeviceId) -> Result<Option<FleetDevice>, RegistryError> {
        Ok(self
            .list_all(true)
            .await?
            .into_iter()
            .find(|d| &d.device.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{device_with_act, FakeApi};

    fn router() -> GroupRouter {
        GroupRouter::new(
            2581,
            vec![GroupRule {
                group_id: 2236,
                device_names: vec!["キラリナ".into(), "Lindt".into()],
                act_names: vec!["Viewer Analysis".into(), "WalkerInsight".into()],
            }],
        )
    }

    #[test]
    fn test_heuristic_routing() {
        let r = router();
        assert_eq!(r.route(&device_with_act("1", "Lindt Ginza", 1, "x"), None), 2236);
        assert_eq!(
            r.route(&device_with_act("2", "Shop", 9960, "Kirarina Viewer Analysis"), None),
            2236
        );
        assert_eq!(r.route(&device_with_act("3", "Shop", 9917, "Counter"), None), 2581);
    }

    #[test]
    fn test_listing_group_wins() {
        let r = router();
        let d = device_with_act("1", "Lindt Ginza", 1, "x");
        assert_eq!(r.route(&d, Some(2581)), 2581);
    }

    #[test]
    fn test_default_group_must_have_client() {
        let err = Fleet::new(vec![FakeApi::new(2236)], router()).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_list_all_tags_groups() {
        let a = FakeApi::new(2581).with_devices(vec![device_with_act("1", "A", 9917, "x")]);
        let b = FakeApi::new(2236).with_devices(vec![
            device_with_act("2", "B", 9960, "y"),
            device_with_act("3", "C", 9916, "z"),
        ]);
        let fleet = Fleet::new(vec![a, b], router()).unwrap();

        let all = fleet.list_all(true).await.unwrap();
        let tagged: Vec<_> = all
            .iter()
            .map(|d| (d.device.id.as_str(), d.group_id))
            .collect();
        assert_eq!(tagged, vec![("1", 2581), ("2", 2236), ("3", 2236)]);

        let found = fleet.find(&DeviceId::from("3")).await.unwrap().unwrap();
        assert_eq!(found.group_id, 2236);
        assert_eq!(fleet.client_for(&found.device, Some(found.group_id)).group_id(), 2236);
        assert!(fleet.find(&DeviceId::from("9")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pagination_follows_cursor() {
        let devices = (0..5)
            .map(|i| device_with_act(&i.to_string(), "d", 9917, "x"))
            .collect();
        let api = FakeApi::new(2581).with_devices(devices).with_page_size(2);
        let listed = api.list_all_devices(false).await.unwrap();
        assert_eq!(listed.len(), 5);
        assert_eq!(api.list_calls(), 3);
    }
}
