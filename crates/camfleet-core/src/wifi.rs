//! Ordered Wi-Fi credential list
//!
//! The device tries networks in list order, so position is meaningful. SSIDs
//! are unique. The registry only accepts whole-list replacement, so every
//! edit here produces a complete new list and leaves `self` untouched; the
//! caller commits the new list once the remote replace has succeeded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WifiError {
    #[error("SSID must not be empty")]
    EmptySsid,
    #[error("Network {0:?} is already configured; confirm to overwrite it")]
    NeedsConfirmation(String),
    #[error("Network {0:?} is not configured")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    pub ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl WifiNetwork {
    /// An empty password is treated as no password
    pub fn new(ssid: impl Into<String>, password: Option<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.filter(|p| !p.is_empty()),
        }
    }

    pub fn open(ssid: impl Into<String>) -> Self {
        Self::new(ssid, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// What an add did to the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AddOutcome {
    Appended { index: usize },
    Replaced { index: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WifiList {
    networks: Vec<WifiNetwork>,
}

impl WifiList {
    /// Build from a remote list, keeping the first entry for any repeated SSID
    pub fn new(networks: Vec<WifiNetwork>) -> Self {
        let mut list = Self::default();
        for network in networks {
            if !list.contains(&network.ssid) {
                list.networks.push(network);
            }
        }
        list
    }

    pub fn networks(&self) -> &[WifiNetwork] {
        &self.networks
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn position(&self, ssid: &str) -> Option<usize> {
        self.networks.iter().position(|n| n.ssid == ssid)
    }

    pub fn contains(&self, ssid: &str) -> bool {
        self.position(ssid).is_some()
    }

    /// Append a new network, or replace an existing one in place when
    /// `confirmed` is set. Replacing keeps the entry's position.
    pub fn with_added(
        &self,
        network: WifiNetwork,
        confirmed: bool,
    ) -> Result<(WifiList, AddOutcome), WifiError> {
        if network.ssid.trim().is_empty() {
            return Err(WifiError::EmptySsid);
        }

        let mut next = self.clone();
        match self.position(&network.ssid) {
            Some(_) if !confirmed => Err(WifiError::NeedsConfirmation(network.ssid)),
            Some(index) => {
                next.networks[index] = network;
                Ok((next, AddOutcome::Replaced { index }))
            }
            None => {
                next.networks.push(network);
                let index = next.networks.len() - 1;
                Ok((next, AddOutcome::Appended { index }))
            }
        }
    }

    pub fn without(&self, ssid: &str) -> Result<WifiList, WifiError> {
        if !self.contains(ssid) {
            return Err(WifiError::NotFound(ssid.to_string()));
        }
        Ok(Self {
            networks: self
                .networks
                .iter()
                .filter(|n| n.ssid != ssid)
                .cloned()
                .collect(),
        })
    }

    /// Swap the entry at `index` with its neighbour. `None` when either
    /// position is out of range, in which case nothing should be sent.
    pub fn with_moved(&self, index: usize, direction: MoveDirection) -> Option<WifiList> {
        let target = match direction {
            MoveDirection::Up => index.checked_sub(1)?,
            MoveDirection::Down => index + 1,
        };
        if index >= self.len() || target >= self.len() {
            return None;
        }
        let mut next = self.clone();
        next.networks.swap(index, target);
        Some(next)
    }
}
