use serde::{Deserialize, Serialize};

/// Metric kind. Counters accumulate deltas, gauges keep the latest reading.
///
/// # Examples
///
/// ```
/// use tally_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(MetricKind::Gauge.to_string(), "gauge");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(ValidationError::UnknownKind(s.to_string())),
        }
    }
}

/// A malformed metric record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("metric id must not be empty")]
    EmptyId,

    #[error("unknown metric kind '{0}'")]
    UnknownKind(String),

    #[error("{kind} '{id}' is missing its {field}")]
    MissingField {
        id: String,
        kind: MetricKind,
        field: &'static str,
    },

    #[error("{kind} '{id}' must not carry a {field}")]
    UnexpectedField {
        id: String,
        kind: MetricKind,
        field: &'static str,
    },

    #[error("record #{index} in batch: {source}")]
    InBatch {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

/// A single metric sample as it travels over the wire and into snapshots.
///
/// `delta` is only meaningful for counters and `value` only for gauges. The
/// record is deliberately loose so decoding never fails on a missing field;
/// call [`MetricRecord::validate`] before applying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRecord {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// Checks the kind/field invariant and returns the typed form.
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_common::types::{Metric, MetricKind, MetricRecord, ValidationError};
    ///
    /// let ok = MetricRecord::counter("PollCount", 1).validate().unwrap();
    /// assert_eq!(ok, Metric::Counter { id: "PollCount".into(), delta: 1 });
    ///
    /// let bad = MetricRecord {
    ///     id: "x".into(),
    ///     kind: MetricKind::Counter,
    ///     delta: None,
    ///     value: Some(1.0),
    /// };
    /// assert!(matches!(bad.validate(), Err(ValidationError::MissingField { .. })));
    /// ```
    pub fn validate(&self) -> Result<Metric, ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        match self.kind {
            MetricKind::Counter => {
                if self.value.is_some() && self.delta.is_some() {
                    return Err(self.unexpected("value"));
                }
                let delta = self.delta.ok_or_else(|| self.missing("delta"))?;
                Ok(Metric::Counter {
                    id: self.id.clone(),
                    delta,
                })
            }
            MetricKind::Gauge => {
                if self.delta.is_some() && self.value.is_some() {
                    return Err(self.unexpected("delta"));
                }
                let value = self.value.ok_or_else(|| self.missing("value"))?;
                Ok(Metric::Gauge {
                    id: self.id.clone(),
                    value,
                })
            }
        }
    }

    fn missing(&self, field: &'static str) -> ValidationError {
        ValidationError::MissingField {
            id: self.id.clone(),
            kind: self.kind,
            field,
        }
    }

    fn unexpected(&self, field: &'static str) -> ValidationError {
        ValidationError::UnexpectedField {
            id: self.id.clone(),
            kind: self.kind,
            field,
        }
    }
}

/// A validated metric, ready to be applied to aggregate state.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Counter { id: String, delta: i64 },
    Gauge { id: String, value: f64 },
}

impl Metric {
    pub fn id(&self) -> &str {
        match self {
            Metric::Counter { id, .. } | Metric::Gauge { id, .. } => id,
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter { .. } => MetricKind::Counter,
            Metric::Gauge { .. } => MetricKind::Gauge,
        }
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Counter { id, delta } => MetricRecord::counter(id, delta),
            Metric::Gauge { id, value } => MetricRecord::gauge(id, value),
        }
    }
}

/// Ordered group of records produced by one sampling cycle.
///
/// Serializes as a bare JSON array so it doubles as the `/updates/` request
/// body and the snapshot document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricBatch {
    records: Vec<MetricRecord>,
}

impl MetricBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MetricRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, other: MetricBatch) {
        self.records.extend(other.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricRecord> {
        self.records.iter()
    }

    /// Validates every record, in order, before anything is applied.
    pub fn validate(&self) -> Result<Vec<Metric>, ValidationError> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record.validate().map_err(|e| ValidationError::InBatch {
                    index,
                    source: Box::new(e),
                })
            })
            .collect()
    }
}

impl From<Vec<MetricRecord>> for MetricBatch {
    fn from(records: Vec<MetricRecord>) -> Self {
        Self { records }
    }
}

impl FromIterator<MetricRecord> for MetricBatch {
    fn from_iter<I: IntoIterator<Item = MetricRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for MetricBatch {
    type Item = MetricRecord;
    type IntoIter = std::vec::IntoIter<MetricRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a MetricBatch {
    type Item = &'a MetricRecord;
    type IntoIter = std::slice::Iter<'a, MetricRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
