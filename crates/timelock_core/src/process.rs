use std::fmt::{Debug, Display, Formatter};

/// Identifies who recorded an event: a numbered client process or the fault-injecting nemesis.
///
/// Processes are only compared for grouping. Their numeric order carries no meaning beyond
/// giving per-process views a stable iteration order.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Process {
    Client(u64),
    Nemesis,
}

impl Process {
    pub fn is_nemesis(&self) -> bool {
        matches!(self, Process::Nemesis)
    }
}

impl Debug for Process {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Process {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Process::Client(n) => {
                f.write_str(":")?;
                Display::fmt(n, f)
            }
            Process::Nemesis => f.write_str("nemesis"),
        }
    }
}

impl From<u64> for Process {
    fn from(n: u64) -> Self {
        Process::Client(n)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Process {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Client(u64),
            Name(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Client(n) => Ok(Process::Client(n)),
            Repr::Name(name) if name == "nemesis" => Ok(Process::Nemesis),
            Repr::Name(name) => Err(serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(&name),
                &"a process number or \"nemesis\"",
            )),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Process {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Process::Client(n) => serializer.serialize_u64(*n),
            Process::Nemesis => serializer.serialize_str("nemesis"),
        }
    }
}
