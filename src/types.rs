use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::temperature::Temperature;
use crate::{Error, Result};

/// Infinitude wraps scalar config values in one-element arrays
/// (`"htsp": ["68.0"]`), a leftover of its XML-to-JSON conversion.
/// Reads require exactly one element; writes re-wrap.
pub(crate) mod one_opt {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(v) => std::slice::from_ref(v).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        match Option::<Vec<T>>::deserialize(deserializer)? {
            None => Ok(None),
            Some(mut items) if items.len() == 1 => Ok(items.pop()),
            Some(items) => Err(D::Error::invalid_length(
                items.len(),
                &"a one-element array",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityId {
    Home,
    Away,
    Sleep,
    Wake,
    Manual,
}

impl ActivityId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityId::Home => "home",
            ActivityId::Away => "away",
            ActivityId::Sleep => "sleep",
            ActivityId::Wake => "wake",
            ActivityId::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "home" => Some(ActivityId::Home),
            "away" => Some(ActivityId::Away),
            "sleep" => Some(ActivityId::Sleep),
            "wake" => Some(ActivityId::Wake),
            "manual" => Some(ActivityId::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnOff {
    On,
    Off,
}

impl OnOff {
    pub fn is_on(self) -> bool {
        self == OnOff::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualMode {
    Heat,
    Cool,
    Off,
}

/// What the zone is doing right now, from the `zoneconditioning` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneConditioning {
    Idle,
    ActiveHeat,
    ActiveCool,
}

impl ZoneConditioning {
    pub fn from_infinitude_str(s: &str) -> Option<Self> {
        match s {
            "idle" | "off" => Some(ZoneConditioning::Idle),
            "active_heat" | "prep_heat" => Some(ZoneConditioning::ActiveHeat),
            "active_cool" | "prep_cool" => Some(ZoneConditioning::ActiveCool),
            _ => None,
        }
    }
}

// -- systems.json (mutable config) --

/// The full `systems.json` document. Unknown device fields ride along in
/// `extra` maps so a mutated document can be posted back whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub system: Vec<SystemEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigDocument {
    /// Parse boundary check: the nesting the device promises must be there.
    pub(crate) fn validate(&self) -> Result<()> {
        self.system
            .first()
            .and_then(|s| s.config.first())
            .map(|_| ())
            .ok_or_else(|| Error::Decode("systems.json: missing system[0].config[0]".to_string()))
    }

    pub fn config(&self) -> Option<&SystemConfig> {
        self.system.first().and_then(|s| s.config.first())
    }

    pub fn mode(&self) -> Option<&str> {
        self.config().and_then(|c| c.mode.as_deref())
    }

    pub fn zones(&self) -> &[ZoneConfig] {
        self.config()
            .and_then(|c| c.zones.first())
            .map(|z| z.zone.as_slice())
            .unwrap_or(&[])
    }

    pub fn zone(&self, id: &str) -> Option<&ZoneConfig> {
        self.zones().iter().find(|z| z.id == id)
    }

    pub fn zone_mut(&mut self, id: &str) -> Option<&mut ZoneConfig> {
        self.system
            .first_mut()
            .and_then(|s| s.config.first_mut())
            .and_then(|c| c.zones.first_mut())
            .and_then(|z| z.zone.iter_mut().find(|z| z.id == id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEntry {
    pub config: Vec<SystemConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub zones: Vec<ZoneList>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneList {
    pub zone: Vec<ZoneConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub id: String,
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<OnOff>,
    #[serde(
        rename = "holdActivity",
        default,
        with = "one_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub hold_activity: Option<ActivityId>,
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub hold: Option<OnOff>,
    /// Hold expiry as "HH:MM" device local time; absent means hold forever.
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub otmr: Option<String>,
    #[serde(
        rename = "manualMode",
        default,
        with = "one_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub manual_mode: Option<ManualMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activities: Vec<ActivityList>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub program: Vec<WeeklyProgram>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ZoneConfig {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.is_some_and(OnOff::is_on)
    }

    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.activities
            .first()
            .and_then(|a| a.activity.iter().find(|a| a.id == id))
    }

    pub fn activity_mut(&mut self, id: ActivityId) -> Option<&mut Activity> {
        self.activities
            .first_mut()
            .and_then(|a| a.activity.iter_mut().find(|a| a.id == id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityList {
    pub activity: Vec<Activity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub htsp: Option<String>,
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub clsp: Option<String>,
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub fan: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    pub fn heat_setpoint(&self) -> Result<Temperature> {
        let raw = self
            .htsp
            .as_deref()
            .ok_or_else(|| Error::Decode(format!("activity {} has no htsp", self.id)))?;
        Temperature::from_infinitude(raw)
    }

    pub fn cool_setpoint(&self) -> Result<Temperature> {
        let raw = self
            .clsp
            .as_deref()
            .ok_or_else(|| Error::Decode(format!("activity {} has no clsp", self.id)))?;
        Temperature::from_infinitude(raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyProgram {
    pub day: Vec<DayProgram>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayProgram {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub period: Vec<Period>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<OnOff>,
    #[serde(default, with = "one_opt", skip_serializing_if = "Option::is_none")]
    pub activity: Option<ActivityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Period {
    pub fn is_enabled(&self) -> bool {
        self.enabled.is_some_and(OnOff::is_on)
    }
}

// -- status.xml (telemetry) --

#[derive(Debug, Clone, Deserialize)]
pub struct StatusDocument {
    #[serde(rename = "@version", default)]
    pub version: Option<String>,
    #[serde(rename = "localTime")]
    pub local_time: String,
    /// Display scale configured on the wall unit ("F" or "C"); setpoint
    /// writes are Fahrenheit regardless.
    #[serde(default)]
    pub cfgem: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub oat: Option<String>,
    #[serde(default)]
    pub filtrlvl: Option<String>,
    pub zones: StatusZoneList,
}

impl StatusDocument {
    /// Device-reported local time, offset stripped. The device is
    /// authoritative for its own time zone.
    pub fn device_time(&self) -> Result<NaiveDateTime> {
        let trimmed = self
            .local_time
            .get(..19)
            .ok_or_else(|| Error::Decode(format!("localTime too short: {:?}", self.local_time)))?;
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| Error::Decode(format!("localTime {:?}: {e}", self.local_time)))
    }

    pub fn outdoor_temperature(&self) -> Option<Temperature> {
        Temperature::from_infinitude(self.oat.as_deref()?).ok()
    }

    pub fn zone(&self, id: &str) -> Option<&ZoneStatus> {
        self.zones.zone.iter().find(|z| z.id == id)
    }

    pub fn enabled_zones(&self) -> impl Iterator<Item = &ZoneStatus> {
        self.zones.zone.iter().filter(|z| z.is_enabled())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusZoneList {
    #[serde(rename = "zone", default)]
    pub zone: Vec<ZoneStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneStatus {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<OnOff>,
    #[serde(rename = "currentActivity", default)]
    pub current_activity: Option<ActivityId>,
    /// Room temperature, °F.
    #[serde(default)]
    pub rt: Option<String>,
    /// Relative humidity, percent.
    #[serde(default)]
    pub rh: Option<String>,
    #[serde(default)]
    pub fan: Option<String>,
    #[serde(default)]
    pub htsp: Option<String>,
    #[serde(default)]
    pub clsp: Option<String>,
    #[serde(default)]
    pub hold: Option<OnOff>,
    #[serde(default)]
    pub zoneconditioning: Option<String>,
}

impl ZoneStatus {
    pub fn is_enabled(&self) -> bool {
        self.enabled.is_some_and(OnOff::is_on)
    }

    pub fn temperature(&self) -> Option<Temperature> {
        Temperature::from_infinitude(self.rt.as_deref()?).ok()
    }

    pub fn humidity(&self) -> Option<f64> {
        self.rh.as_deref()?.trim().parse().ok()
    }

    pub fn conditioning(&self) -> Option<ZoneConditioning> {
        ZoneConditioning::from_infinitude_str(self.zoneconditioning.as_deref()?)
    }
}

// -- write results and holds --

/// Outcome of a config POST. `status: None` means the device was
/// unreachable (timeout or connection failure); a non-2xx code means the
/// device rejected the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub status: Option<u16>,
}

impl WriteResult {
    pub fn accepted(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldUntil {
    Forever,
    Until(chrono::NaiveTime),
}

/// How long a manual override should pin a zone to an activity before the
/// weekly program resumes control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldInstruction {
    pub activity: ActivityId,
    pub until: HoldUntil,
}

/// Which setpoint of an activity a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointField {
    Heat,
    Cool,
}
