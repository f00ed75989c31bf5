use std::cell::Cell;

use serde::Serialize;

use crate::domain::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Downloading,
    Parsing,
    Importing,
    Complete,
    Error,
}

impl Stage {
    /// Number of stages in a successful run.
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            Stage::Downloading => 0,
            Stage::Parsing => 1,
            Stage::Importing => 2,
            Stage::Complete => 3,
            Stage::Error => Self::COUNT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Downloading => "downloading",
            Stage::Parsing => "parsing",
            Stage::Importing => "importing",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProgressPayload {
    Download {
        downloaded: u64,
        total: Option<u64>,
    },
    Rows {
        entity: EntityKind,
        inserted: u64,
        total: Option<u64>,
    },
    Detail {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Index of the stage; for [`Stage::Error`] the index of the stage that failed.
    pub stage_index: usize,
    pub stage_count: usize,
    pub dataset: String,
    pub payload: Option<ProgressPayload>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent),
{
    fn event(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Fire-and-forget emitter bound to one dataset label. A missing sink is a no-op.
pub struct Reporter<'a> {
    sink: Option<&'a dyn ProgressSink>,
    dataset: String,
    current: Cell<Stage>,
}

impl<'a> Reporter<'a> {
    pub fn new(sink: Option<&'a dyn ProgressSink>, dataset: impl Into<String>) -> Self {
        Self {
            sink,
            dataset: dataset.into(),
            current: Cell::new(Stage::Downloading),
        }
    }

    pub fn current(&self) -> Stage {
        self.current.get()
    }

    pub fn stage(&self, stage: Stage) {
        self.emit(stage, None);
    }

    pub fn download(&self, downloaded: u64, total: Option<u64>) {
        self.emit(
            Stage::Downloading,
            Some(ProgressPayload::Download { downloaded, total }),
        );
    }

    pub fn rows(&self, entity: EntityKind, inserted: u64, total: Option<u64>) {
        self.emit(
            Stage::Importing,
            Some(ProgressPayload::Rows {
                entity,
                inserted,
                total,
            }),
        );
    }

    pub fn detail(&self, message: impl Into<String>) {
        self.emit(
            self.current.get(),
            Some(ProgressPayload::Detail {
                message: message.into(),
            }),
        );
    }

    pub fn error(&self, message: impl Into<String>) {
        let Some(sink) = self.sink else {
            return;
        };
        sink.event(ProgressEvent {
            stage: Stage::Error,
            stage_index: self.current.get().index(),
            stage_count: Stage::COUNT,
            dataset: self.dataset.clone(),
            payload: Some(ProgressPayload::Detail {
                message: message.into(),
            }),
        });
    }

    fn emit(&self, stage: Stage, payload: Option<ProgressPayload>) {
        self.current.set(stage);
        let Some(sink) = self.sink else {
            return;
        };
        sink.event(ProgressEvent {
            stage,
            stage_index: stage.index(),
            stage_count: Stage::COUNT,
            dataset: self.dataset.clone(),
            payload,
        });
    }
}
