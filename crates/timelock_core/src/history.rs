use {
    crate::{Event, EventType, Function, Process, Value},
    std::collections::BTreeMap,
    thiserror::Error,
};

/// Reasons a recorded history cannot be audited.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum HistoryError {
    #[error("{process} invoked again at event {index} with an operation still outstanding")]
    OverlappingInvoke { process: Process, index: usize },
    #[error("{process} completed an operation at event {index} without invoking one")]
    UnmatchedCompletion { process: Process, index: usize },
    #[error("{process} completed {completed} at event {index} but had invoked {invoked}")]
    MismatchedCompletion {
        process: Process,
        index: usize,
        invoked: Function,
        completed: Function,
    },
    #[error("nemesis recorded a non-info event at {index}")]
    NemesisCallEvent { index: usize },
}

/// An invocation paired with its completion, if the history recorded one.
#[derive(Clone, Copy, Debug)]
pub struct Operation<'a> {
    pub invoke_index: usize,
    pub invoke: &'a Event,
    pub completion_index: Option<usize>,
    pub completion: Option<&'a Event>,
}

impl<'a> Operation<'a> {
    pub fn process(&self) -> Process {
        self.invoke.process
    }

    pub fn function(&self) -> Function {
        self.invoke.function
    }

    /// The completion if it reported success.
    pub fn ok(&self) -> Option<&'a Event> {
        self.completion.filter(|e| e.kind == EventType::Ok)
    }
}

/// A fault window opened by a nemesis `start` marker and closed by the following `stop`.
///
/// Consecutive markers of the same kind collapse onto the latest one, so a nemesis that logs
/// both the start of its action and its completion yields one episode bracketed by the
/// completion markers.
#[derive(Clone, Copy, Debug)]
pub struct Episode<'a> {
    pub start: &'a Event,
    pub stop: Option<&'a Event>,
}

impl<'a> Episode<'a> {
    /// Client processes the nemesis reported as cut off from quorum.
    pub fn isolated(&self) -> Vec<Process> {
        match &self.start.value {
            Value::List(ids) => ids
                .iter()
                .filter_map(|id| u64::try_from(*id).ok())
                .map(Process::Client)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, time: u64) -> bool {
        self.start.time <= time && self.stop.map_or(true, |stop| time <= stop.time)
    }
}

/// The immutable, time-ordered record of one test execution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventHistory {
    events: Vec<Event>,
    partners: Vec<Option<usize>>,
    by_process: BTreeMap<Process, Vec<usize>>,
    positions: Vec<usize>,
}

impl EventHistory {
    /// Orders `events` by time (ties keep recording order) and checks that every client
    /// process alternates invocations with completions.
    pub fn new(mut events: Vec<Event>) -> Result<Self, HistoryError> {
        events.sort_by_key(|e| e.time);

        let mut partners = vec![None; events.len()];
        let mut positions = Vec::with_capacity(events.len());
        let mut by_process: BTreeMap<Process, Vec<usize>> = BTreeMap::new();
        let mut outstanding: BTreeMap<Process, usize> = BTreeMap::new();
        for (index, event) in events.iter().enumerate() {
            let subsequence = by_process.entry(event.process).or_default();
            positions.push(subsequence.len());
            subsequence.push(index);

            let process = event.process;
            if process.is_nemesis() {
                if event.kind != EventType::Info {
                    return Err(HistoryError::NemesisCallEvent { index });
                }
                continue;
            }
            match event.kind {
                EventType::Invoke => {
                    if outstanding.insert(process, index).is_some() {
                        return Err(HistoryError::OverlappingInvoke { process, index });
                    }
                }
                EventType::Ok | EventType::Fail => {
                    let invoke_index = outstanding
                        .remove(&process)
                        .ok_or(HistoryError::UnmatchedCompletion { process, index })?;
                    let invoked = events[invoke_index].function;
                    if invoked != event.function {
                        return Err(HistoryError::MismatchedCompletion {
                            process,
                            index,
                            invoked,
                            completed: event.function,
                        });
                    }
                    partners[invoke_index] = Some(index);
                    partners[index] = Some(invoke_index);
                }
                EventType::Info => {}
            }
        }

        Ok(EventHistory {
            events,
            partners,
            by_process,
            positions,
        })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Event)> + '_ {
        self.events.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn processes(&self) -> impl Iterator<Item = Process> + '_ {
        self.by_process.keys().copied()
    }

    /// The events of one process, in history order, with their history indices.
    pub fn process_events(&self, process: Process) -> impl Iterator<Item = (usize, &Event)> + '_ {
        self.by_process
            .get(&process)
            .into_iter()
            .flatten()
            .map(move |&index| (index, &self.events[index]))
    }

    /// Nearest event of type `kind` recorded by the same process before `index`.
    pub fn preceding(&self, index: usize, kind: EventType) -> Option<(usize, &Event)> {
        let subsequence = &self.by_process[&self.events.get(index)?.process];
        subsequence[..self.positions[index]]
            .iter()
            .rev()
            .map(|&i| (i, &self.events[i]))
            .find(|(_, e)| e.kind == kind)
    }

    /// Nearest event of type `kind` recorded by the same process after `index`.
    pub fn following(&self, index: usize, kind: EventType) -> Option<(usize, &Event)> {
        let subsequence = &self.by_process[&self.events.get(index)?.process];
        subsequence[self.positions[index] + 1..]
            .iter()
            .map(|&i| (i, &self.events[i]))
            .find(|(_, e)| e.kind == kind)
    }

    /// Index of the `ok`/`fail` event completing the invocation at `index`.
    pub fn completion_of(&self, index: usize) -> Option<usize> {
        match self.events.get(index)?.kind {
            EventType::Invoke => self.partners[index],
            _ => None,
        }
    }

    /// Index of the invocation that the completion at `index` answers.
    pub fn invocation_of(&self, index: usize) -> Option<usize> {
        match self.events.get(index)?.kind {
            EventType::Ok | EventType::Fail => self.partners[index],
            _ => None,
        }
    }

    /// Every client invocation in history order, paired with its completion.
    pub fn operations(&self) -> impl Iterator<Item = Operation<'_>> + '_ {
        self.iter()
            .filter(|(_, e)| e.kind == EventType::Invoke)
            .map(move |(invoke_index, invoke)| {
                let completion_index = self.partners[invoke_index];
                Operation {
                    invoke_index,
                    invoke,
                    completion_index,
                    completion: completion_index.map(|i| &self.events[i]),
                }
            })
    }

    pub fn nemesis_episodes(&self) -> Vec<Episode<'_>> {
        let mut episodes = Vec::new();
        let mut start: Option<&Event> = None;
        let mut stop: Option<&Event> = None;
        for (_, event) in self.process_events(Process::Nemesis) {
            match event.function {
                Function::Start => {
                    if let (Some(open), Some(close)) = (start, stop.take()) {
                        episodes.push(Episode {
                            start: open,
                            stop: Some(close),
                        });
                    }
                    start = Some(event);
                }
                Function::Stop if start.is_some() => stop = Some(event),
                _ => {}
            }
        }
        if let Some(open) = start {
            episodes.push(Episode { start: open, stop });
        }
        episodes
    }
}

impl<'a> IntoIterator for &'a EventHistory {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
