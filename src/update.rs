use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::client::InfinitudeClient;
use crate::temperature::Temperature;
use crate::types::{
    ActivityId, HoldInstruction, HoldUntil, OnOff, SetpointField, WriteResult, ZoneConfig,
};
use crate::{Error, Result};

const DEFAULT_WRITE_TTL: Duration = Duration::from_secs(30);

/// Read-modify-write orchestration against the config document.
///
/// Writes to the same zone are serialized through a per-zone lock so two
/// in-flight mutations can never be built from two different stale base
/// snapshots. Writes to different zones may interleave.
pub struct UpdateCoordinator {
    client: InfinitudeClient,
    write_ttl: Duration,
    zone_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UpdateCoordinator {
    pub fn new(client: InfinitudeClient) -> Self {
        Self {
            client,
            write_ttl: DEFAULT_WRITE_TTL,
            zone_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the snapshot TTL used for writes. Long enough to avoid a
    /// GET per rapid-fire setpoint drag, short enough not to write over an
    /// ancient snapshot.
    pub fn write_ttl(mut self, ttl: Duration) -> Self {
        self.write_ttl = ttl;
        self
    }

    fn zone_lock(&self, zone_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.zone_locks
            .lock()
            .entry(zone_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Snapshot the config, apply `mutate` to a private copy of the target
    /// zone, and POST the whole document back.
    ///
    /// The shared cache never holds the speculative local mutation: on an
    /// accepted write it is invalidated and eagerly refetched from the
    /// device; on a rejected or failed write it is left untouched, so the
    /// next read still serves the pre-write snapshot.
    pub async fn update_zone<F>(&self, zone_id: &str, mutate: F) -> Result<WriteResult>
    where
        F: FnOnce(&mut ZoneConfig) -> Result<()>,
    {
        let lock = self.zone_lock(zone_id);
        let _write = lock.lock().await;

        let mut doc = self
            .client
            .config_snapshot(self.write_ttl)
            .await
            .ok_or(Error::StaleData)?;

        let zone = doc
            .zone_mut(zone_id)
            .ok_or_else(|| Error::ZoneNotFound(zone_id.to_string()))?;
        mutate(zone)?;

        let result = self.client.post_config(&doc).await;
        if result.accepted() {
            debug!(zone = zone_id, "write accepted, refreshing config");
            self.client.cache().invalidate_config();
            let _ = self.client.refresh_config().await;
        }
        Ok(result)
    }

    /// Pin the zone to an activity indefinitely.
    pub async fn set_activity(&self, zone_id: &str, activity: ActivityId) -> Result<WriteResult> {
        self.set_hold(
            zone_id,
            HoldInstruction {
                activity,
                until: HoldUntil::Forever,
            },
        )
        .await
    }

    /// Pin the zone to an activity until a device-local time, or forever.
    pub async fn set_hold(&self, zone_id: &str, hold: HoldInstruction) -> Result<WriteResult> {
        self.update_zone(zone_id, |zone| {
            zone.hold_activity = Some(hold.activity);
            zone.hold = Some(OnOff::On);
            zone.otmr = match hold.until {
                HoldUntil::Forever => None,
                HoldUntil::Until(t) => Some(t.format("%H:%M").to_string()),
            };
            Ok(())
        })
        .await
    }

    /// Drop any hold and let the weekly program resume control.
    pub async fn release_hold(&self, zone_id: &str) -> Result<WriteResult> {
        self.update_zone(zone_id, |zone| {
            zone.hold = Some(OnOff::Off);
            zone.hold_activity = None;
            zone.otmr = None;
            Ok(())
        })
        .await
    }

    /// Overwrite one setpoint of a named activity, converting to the
    /// device's whole-degree Fahrenheit format.
    pub async fn set_setpoint(
        &self,
        zone_id: &str,
        activity: ActivityId,
        field: SetpointField,
        target: Temperature,
    ) -> Result<WriteResult> {
        let zone_owned = zone_id.to_string();
        self.update_zone(zone_id, move |zone| {
            let act = zone
                .activity_mut(activity)
                .ok_or_else(|| Error::ActivityNotFound {
                    zone: zone_owned,
                    activity,
                })?;
            let value = target.to_infinitude();
            match field {
                SetpointField::Heat => act.htsp = Some(value),
                SetpointField::Cool => act.clsp = Some(value),
            }
            Ok(())
        })
        .await
    }

    /// Both setpoints of an activity in a single read-modify-write.
    pub async fn update_temperatures(
        &self,
        zone_id: &str,
        activity: ActivityId,
        heat: Temperature,
        cool: Temperature,
    ) -> Result<WriteResult> {
        let zone_owned = zone_id.to_string();
        self.update_zone(zone_id, move |zone| {
            let act = zone
                .activity_mut(activity)
                .ok_or_else(|| Error::ActivityNotFound {
                    zone: zone_owned,
                    activity,
                })?;
            act.htsp = Some(heat.to_infinitude());
            act.clsp = Some(cool.to_infinitude());
            Ok(())
        })
        .await
    }

    /// Manual override that expires at the next scheduled period, or never
    /// if the week has no enabled period.
    pub async fn hold_until_next_transition(
        &self,
        zone_id: &str,
        activity: ActivityId,
    ) -> Result<WriteResult> {
        let until = self
            .client
            .next_scheduled_transition(zone_id)
            .await?
            .map(HoldUntil::Until)
            .unwrap_or(HoldUntil::Forever);
        self.set_hold(zone_id, HoldInstruction { activity, until })
            .await
    }
}
