#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Passenger-flow model schema.
//!
//! A [`Model`] is a declarative document (JSON or TOML) describing, per
//! location, base boarding/alighting rates and the seasonal and event
//! modifiers that apply to them, together with network-wide time patterns,
//! trip-purpose demand profiles and real-time adjustment tables. The factor
//! engine evaluates a model into [`FlowResult`] values.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Top-level passenger-flow model document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Optional human-readable model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Per-location rate profiles keyed by location id.
    pub locations: BTreeMap<String, LocationProfile>,
    /// Network-wide peak windows, day types and holidays.
    #[serde(default)]
    pub time_patterns: TimePatterns,
    /// Trip-purpose mix keyed by purpose name.
    #[serde(default)]
    pub demand_profiles: BTreeMap<String, DemandProfile>,
    /// Lookup tables keyed by the current real-time condition.
    #[serde(default)]
    pub real_time_adjustments: RealTimeAdjustments,
}

/// Rate profile for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationProfile {
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Boarding and alighting base rates.
    pub passenger_rates: PassengerRates,
    /// Per-season multipliers.
    #[serde(default)]
    pub seasonal_factors: SeasonalFactors,
    /// Special events that modify demand when their pattern matches.
    #[serde(default)]
    pub special_events: Vec<SpecialEvent>,
}

/// Boarding and alighting rates, each split by peak state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassengerRates {
    /// Passengers getting on.
    pub boarding: PeakRates,
    /// Passengers getting off.
    pub alighting: PeakRates,
}

/// A rate for peak and off-peak periods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakRates {
    /// Rate during a configured peak window.
    pub peak: RateSpec,
    /// Rate outside every peak window.
    pub off_peak: RateSpec,
}

impl PeakRates {
    /// Selects the rate for the given peak state.
    #[must_use]
    pub const fn select(&self, is_peak: bool) -> &RateSpec {
        if is_peak { &self.peak } else { &self.off_peak }
    }
}

const fn default_confidence() -> f64 {
    0.95
}

/// A base rate with its sampling variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSpec {
    /// Mean passengers per hour.
    pub rate_per_hour: f64,
    /// Relative half-width of the uniform variance band (0..=1).
    #[serde(default)]
    pub variance: f64,
    /// Confidence attached to the rate estimate (0..=1).
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
}

/// The four fixed seasons.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Season {
    /// December through February.
    Winter,
    /// March through May.
    Spring,
    /// June through August.
    Summer,
    /// September through November.
    Autumn,
}

impl Season {
    /// Buckets a calendar month (1-12) into its season.
    #[must_use]
    pub const fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Autumn,
            _ => Self::Winter,
        }
    }
}

/// Per-season multipliers. Missing seasons default to `1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonalFactors {
    /// Winter multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winter: Option<f64>,
    /// Spring multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spring: Option<f64>,
    /// Summer multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summer: Option<f64>,
    /// Autumn multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autumn: Option<f64>,
}

impl SeasonalFactors {
    /// Returns the multiplier for `season`.
    #[must_use]
    pub fn factor(&self, season: Season) -> f64 {
        match season {
            Season::Winter => self.winter,
            Season::Spring => self.spring,
            Season::Summer => self.summer,
            Season::Autumn => self.autumn,
        }
        .unwrap_or(1.0)
    }

    /// Iterates over the explicitly configured seasons.
    pub fn configured(&self) -> impl Iterator<Item = (Season, f64)> {
        [
            (Season::Winter, self.winter),
            (Season::Spring, self.spring),
            (Season::Summer, self.summer),
            (Season::Autumn, self.autumn),
        ]
        .into_iter()
        .filter_map(|(season, v)| v.map(|v| (season, v)))
    }
}

/// A demand modifier active on dates matching its pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialEvent {
    /// Event name, reported back in [`FlowResult::active_events`].
    pub name: String,
    /// When the event applies.
    pub pattern: EventPattern,
    /// Multiplier applied while the event is active.
    pub multiplier: f64,
}

fn all_days() -> Vec<DayOfWeek> {
    DayOfWeek::ALL.to_vec()
}

/// Date/time predicate for a special event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPattern {
    /// Monday to Friday, 06:00 to 10:00.
    WeekdayMornings,
    /// Monday to Friday, 16:00 to 19:00.
    WeekdayEvenings,
    /// Saturday and Sunday, all day.
    Weekends,
    /// The first Saturday of every month.
    FirstSaturdayOfMonth,
    /// The last Friday of every month.
    LastFridayOfMonth,
    /// A fixed calendar day every year.
    MonthDay {
        /// Month (1-12).
        month: u32,
        /// Day of month (1-31).
        day: u32,
    },
    /// A single calendar date.
    Date {
        /// The date.
        date: NaiveDate,
    },
    /// Any time on the listed weekdays.
    Weekdays {
        /// Days the event applies to.
        days: Vec<DayOfWeek>,
    },
    /// A time-of-day window on the listed weekdays.
    TimeWindow {
        /// Window start (inclusive).
        start: ClockTime,
        /// Window end (exclusive); earlier than `start` wraps past midnight.
        end: ClockTime,
        /// Days the window starts on.
        #[serde(default = "all_days")]
        days: Vec<DayOfWeek>,
    },
}

/// Day of the week as written in model documents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DayOfWeek {
    /// Monday.
    #[serde(alias = "mon")]
    #[strum(to_string = "monday", serialize = "mon")]
    Monday,
    /// Tuesday.
    #[serde(alias = "tue")]
    #[strum(to_string = "tuesday", serialize = "tue")]
    Tuesday,
    /// Wednesday.
    #[serde(alias = "wed")]
    #[strum(to_string = "wednesday", serialize = "wed")]
    Wednesday,
    /// Thursday.
    #[serde(alias = "thu")]
    #[strum(to_string = "thursday", serialize = "thu")]
    Thursday,
    /// Friday.
    #[serde(alias = "fri")]
    #[strum(to_string = "friday", serialize = "fri")]
    Friday,
    /// Saturday.
    #[serde(alias = "sat")]
    #[strum(to_string = "saturday", serialize = "sat")]
    Saturday,
    /// Sunday.
    #[serde(alias = "sun")]
    #[strum(to_string = "sunday", serialize = "sun")]
    Sunday,
}

impl DayOfWeek {
    /// Every day, Monday first.
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    /// Converts from a `chrono` weekday.
    #[must_use]
    pub const fn from_chrono(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }

    /// Returns `true` for Monday through Friday.
    #[must_use]
    pub const fn is_weekday(self) -> bool {
        !matches!(self, Self::Saturday | Self::Sunday)
    }
}

/// Error returned when a clock time is not written as `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidClockTimeError {
    /// The rejected input.
    pub input: String,
}

impl std::fmt::Display for InvalidClockTimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid clock time '{}': expected HH:MM", self.input)
    }
}

impl std::error::Error for InvalidClockTimeError {}

/// A time of day with minute resolution, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    /// Creates a clock time, returning `None` for out-of-range values.
    #[must_use]
    pub const fn new(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self {
                minutes: hour * 60 + minute,
            })
        } else {
            None
        }
    }

    /// Minutes since midnight.
    #[must_use]
    pub const fn minutes(self) -> u16 {
        self.minutes
    }

    /// The clock time of `time`, truncated to the minute.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn of(time: NaiveDateTime) -> Self {
        Self {
            minutes: (time.hour() * 60 + time.minute()) as u16,
        }
    }
}

impl std::str::FromStr for ClockTime {
    type Err = InvalidClockTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidClockTimeError {
            input: s.to_owned(),
        };
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        let hour = h.parse::<u16>().map_err(|_| err())?;
        let minute = m.parse::<u16>().map_err(|_| err())?;
        Self::new(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = InvalidClockTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(time: ClockTime) -> Self {
        time.to_string()
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

/// Network-wide temporal patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimePatterns {
    /// Windows during which the peak rate table applies.
    #[serde(default)]
    pub peak_hours: Vec<PeakWindow>,
    /// Multipliers per day type.
    #[serde(default)]
    pub day_types: DayTypeMultipliers,
    /// Extra holiday dates on top of the fixed civic calendar.
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

const fn default_multiplier() -> f64 {
    1.0
}

/// A peak period on a set of weekdays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakWindow {
    /// Optional label (e.g. `"morning"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Window start (inclusive).
    pub start: ClockTime,
    /// Window end (exclusive); earlier than `start` wraps past midnight.
    pub end: ClockTime,
    /// Days the window starts on.
    pub days: Vec<DayOfWeek>,
    /// Extra time multiplier while the window is active.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Day categories, in order of precedence when resolving a date.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DayType {
    /// A civic holiday.
    Holiday,
    /// Sunday.
    Sunday,
    /// Saturday.
    Saturday,
    /// Monday through Friday.
    Weekday,
}

/// Multipliers per [`DayType`]. Missing entries default to `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayTypeMultipliers {
    /// Monday through Friday.
    #[serde(default = "default_multiplier")]
    pub weekday: f64,
    /// Saturday.
    #[serde(default = "default_multiplier")]
    pub saturday: f64,
    /// Sunday.
    #[serde(default = "default_multiplier")]
    pub sunday: f64,
    /// Civic holidays.
    #[serde(default = "default_multiplier")]
    pub holiday: f64,
}

impl Default for DayTypeMultipliers {
    fn default() -> Self {
        Self {
            weekday: 1.0,
            saturday: 1.0,
            sunday: 1.0,
            holiday: 1.0,
        }
    }
}

impl DayTypeMultipliers {
    /// Returns the multiplier for `day_type`.
    #[must_use]
    pub const fn factor(&self, day_type: DayType) -> f64 {
        match day_type {
            DayType::Holiday => self.holiday,
            DayType::Sunday => self.sunday,
            DayType::Saturday => self.saturday,
            DayType::Weekday => self.weekday,
        }
    }
}

/// Which peak state a trip purpose prefers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PeakPreference {
    /// Boosted during peak windows.
    Peak,
    /// Boosted outside peak windows.
    OffPeak,
    /// Never boosted.
    Neutral,
}

impl PeakPreference {
    /// Returns `true` if this preference matches the given peak state.
    #[must_use]
    pub const fn matches(self, is_peak: bool) -> bool {
        match self {
            Self::Peak => is_peak,
            Self::OffPeak => !is_peak,
            Self::Neutral => false,
        }
    }
}

/// Share of trips for one purpose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandProfile {
    /// Share of all trips, in percent.
    pub percentage: f64,
    /// When this purpose is most common.
    pub peak_preference: PeakPreference,
}

/// Real-time lookup tables keyed by the current condition string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealTimeAdjustments {
    /// Keyed by weather condition (e.g. `"rain"`).
    #[serde(default)]
    pub weather_impact: BTreeMap<String, f64>,
    /// Keyed by service status (e.g. `"delayed"`).
    #[serde(default)]
    pub service_disruptions: BTreeMap<String, f64>,
    /// Keyed by economic condition (e.g. `"payday"`).
    #[serde(default)]
    pub economic_factors: BTreeMap<String, f64>,
    /// Keyed by infrastructure status (e.g. `"road_works"`).
    #[serde(default)]
    pub infrastructure_events: BTreeMap<String, f64>,
}

/// The kinds of real-time condition the engine tracks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConditionKind {
    /// Current weather.
    Weather,
    /// Current service status.
    ServiceStatus,
    /// Current economic condition.
    EconomicCondition,
    /// Current infrastructure status.
    InfrastructureStatus,
}

/// Current real-time conditions. Unset conditions contribute `1.0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Weather condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    /// Service status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_status: Option<String>,
    /// Economic condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economic_condition: Option<String>,
    /// Infrastructure status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_status: Option<String>,
}

impl Conditions {
    /// Returns the current value for `kind`.
    #[must_use]
    pub fn get(&self, kind: ConditionKind) -> Option<&str> {
        match kind {
            ConditionKind::Weather => self.weather.as_deref(),
            ConditionKind::ServiceStatus => self.service_status.as_deref(),
            ConditionKind::EconomicCondition => self.economic_condition.as_deref(),
            ConditionKind::InfrastructureStatus => self.infrastructure_status.as_deref(),
        }
    }

    /// Sets the value for `kind`.
    pub fn set(&mut self, kind: ConditionKind, value: impl Into<String>) {
        let slot = match kind {
            ConditionKind::Weather => &mut self.weather,
            ConditionKind::ServiceStatus => &mut self.service_status,
            ConditionKind::EconomicCondition => &mut self.economic_condition,
            ConditionKind::InfrastructureStatus => &mut self.infrastructure_status,
        };
        *slot = Some(value.into());
    }

    /// Sets the value for `kind`, returning `self`.
    #[must_use]
    pub fn with(mut self, kind: ConditionKind, value: impl Into<String>) -> Self {
        self.set(kind, value);
        self
    }

    /// Overwrites every condition that is set in `update`, leaving the
    /// others untouched.
    pub fn merge(&mut self, update: Self) {
        let Self {
            weather,
            service_status,
            economic_condition,
            infrastructure_status,
        } = update;
        if weather.is_some() {
            self.weather = weather;
        }
        if service_status.is_some() {
            self.service_status = service_status;
        }
        if economic_condition.is_some() {
            self.economic_condition = economic_condition;
        }
        if infrastructure_status.is_some() {
            self.infrastructure_status = infrastructure_status;
        }
    }
}

/// Individual factor groups that were multiplied together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    /// Day type and active peak window.
    pub time: f64,
    /// Season of the target date.
    pub seasonal: f64,
    /// Product of every matching special event.
    pub event: f64,
    /// Product of the four real-time tables.
    pub real_time: f64,
    /// `time * seasonal * event * real_time`.
    pub combined: f64,
}

/// Expected passenger flow at one location for one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    /// Location id within the model.
    pub location_id: String,
    /// Start of the evaluated window.
    pub timestamp: NaiveDateTime,
    /// Length of the evaluated window.
    pub duration_minutes: u32,
    /// Whether `timestamp` falls in a peak window.
    pub is_peak: bool,
    /// Resolved day type.
    pub day_type: DayType,
    /// Resolved season.
    pub season: Season,
    /// Boarding passengers per hour after factors and variance.
    pub boarding_rate_per_hour: f64,
    /// Alighting passengers per hour after factors and variance.
    pub alighting_rate_per_hour: f64,
    /// Expected boardings over the window.
    pub expected_boarding: f64,
    /// Expected alightings over the window.
    pub expected_alighting: f64,
    /// Confidence of the selected boarding rate.
    pub confidence_level: f64,
    /// The factor groups applied.
    pub factors: FactorBreakdown,
    /// Names of the special events that matched.
    pub active_events: Vec<String>,
    /// Trip-purpose mix in percent, summing to 100.
    pub trip_purposes: BTreeMap<String, f64>,
}
