use {
    crate::Process,
    std::fmt::{self, Debug, Display, Formatter},
};

/// The role an event plays in a call/response pair.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "lowercase")
)]
pub enum EventType {
    Invoke,
    Ok,
    Fail,
    /// Out-of-band annotation such as a nemesis fault marker.
    Info,
}

impl EventType {
    pub fn is_completion(&self) -> bool {
        matches!(self, EventType::Ok | EventType::Fail)
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventType::Invoke => "invoke",
            EventType::Ok => "ok",
            EventType::Fail => "fail",
            EventType::Info => "info",
        })
    }
}

/// Operations the oracle clients perform, plus the nemesis fault markers.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "kebab-case")
)]
pub enum Function {
    GetTimestamp,
    GetTimestamps,
    FastForward,
    AcquireLock,
    RefreshLock,
    ReleaseLock,
    Start,
    Stop,
}

impl Function {
    /// Operations served by the timestamp half of the oracle.
    pub fn is_timestamp_op(&self) -> bool {
        matches!(
            self,
            Function::GetTimestamp | Function::GetTimestamps | Function::FastForward
        )
    }

    /// Operations that return freshly issued timestamps.
    pub fn issues_timestamps(&self) -> bool {
        matches!(self, Function::GetTimestamp | Function::GetTimestamps)
    }

    pub fn is_lock_op(&self) -> bool {
        matches!(
            self,
            Function::AcquireLock | Function::RefreshLock | Function::ReleaseLock
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::GetTimestamp => "get-timestamp",
            Function::GetTimestamps => "get-timestamps",
            Function::FastForward => "fast-forward",
            Function::AcquireLock => "acquire-lock",
            Function::RefreshLock => "refresh-lock",
            Function::ReleaseLock => "release-lock",
            Function::Start => "start",
            Function::Stop => "stop",
        }
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operation-specific payload.
///
/// Timestamp reads carry an `Int`, range reads a two element `List` holding the inclusive
/// bounds, lock invocations the lock id as `Text`, and isolating nemesis markers the `List` of
/// isolated client processes.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(untagged)
)]
pub enum Value {
    Null,
    Int(i64),
    List(Vec<i64>),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Inclusive `(lower, upper)` bounds of the timestamps this value reports.
    pub fn as_range(&self) -> Option<(i64, i64)> {
        match self {
            Value::Int(n) => Some((*n, *n)),
            Value::List(bounds) => match bounds.as_slice() {
                [lower, upper] if lower <= upper => Some((*lower, *upper)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("nil"),
            Value::Int(n) => Display::fmt(n, f),
            Value::List(items) => {
                f.write_str("[")?;
                let mut iter = items.iter();
                if let Some(first) = iter.next() {
                    Display::fmt(first, f)?;
                    for item in iter {
                        write!(f, " {item}")?;
                    }
                }
                f.write_str("]")
            }
            Value::Text(s) => Debug::fmt(s, f),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// One record of an execution history.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Event {
    pub process: Process,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: EventType,
    #[cfg_attr(feature = "serde", serde(rename = "f"))]
    pub function: Function,
    pub value: Value,
    pub time: u64,
}

impl Event {
    pub fn new(
        process: impl Into<Process>,
        kind: EventType,
        function: Function,
        value: impl Into<Value>,
        time: u64,
    ) -> Self {
        Event {
            process: process.into(),
            kind,
            function,
            value: value.into(),
            time,
        }
    }

    pub fn invoke(process: u64, function: Function, value: impl Into<Value>, time: u64) -> Self {
        Event::new(process, EventType::Invoke, function, value, time)
    }

    pub fn ok(process: u64, function: Function, value: impl Into<Value>, time: u64) -> Self {
        Event::new(process, EventType::Ok, function, value, time)
    }

    pub fn fail(process: u64, function: Function, value: impl Into<Value>, time: u64) -> Self {
        Event::new(process, EventType::Fail, function, value, time)
    }

    pub fn nemesis(function: Function, value: impl Into<Value>, time: u64) -> Self {
        Event::new(Process::Nemesis, EventType::Info, function, value, time)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<Vec<i64>> for Value {
    fn from(items: Vec<i64>) -> Self {
        Value::List(items)
    }
}

// Unsuffixed integer literals fall back to `i32`.
impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<Vec<i32>> for Value {
    fn from(items: Vec<i32>) -> Self {
        Value::List(items.into_iter().map(i64::from).collect())
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}@{}",
            self.process, self.kind, self.function, self.value, self.time
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn can_display() {
        assert_eq!(
            Event::ok(0, Function::GetTimestamps, vec![3, 7], 12).to_string(),
            ":0 ok get-timestamps [3 7]@12"
        );
        assert_eq!(
            Event::nemesis(Function::Start, "start!", 5).to_string(),
            "nemesis info start \"start!\"@5"
        );
        assert_eq!(
            Event::invoke(1, Function::GetTimestamp, (), 1).to_string(),
            ":1 invoke get-timestamp nil@1"
        );
    }

    #[test]
    fn reads_ranges() {
        assert_eq!(Value::Int(4).as_range(), Some((4, 4)));
        assert_eq!(Value::List(vec![4, 9]).as_range(), Some((4, 9)));
        assert_eq!(Value::List(vec![9, 4]).as_range(), None);
        assert_eq!(Value::List(vec![1, 2, 3]).as_range(), None);
        assert_eq!(Value::Null.as_range(), None);
    }

    #[cfg(feature = "serde_json")]
    #[test]
    fn uses_flat_record_keys() {
        let event = Event::nemesis(Function::Stop, "stop!", 18805796986);
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"process":"nemesis","type":"info","f":"stop","value":"stop!","time":18805796986}"#
        );
        let parsed: Event = serde_json::from_str(
            r#"{"process":2,"type":"ok","f":"get-timestamps","value":[10,19],"time":7}"#,
        )
        .unwrap();
        assert_eq!(parsed, Event::ok(2, Function::GetTimestamps, vec![10, 19], 7));
    }
}
