use std::io::{self, Write};

use livecheck_core::{checklist, ChecklistRow, Snapshot};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Renders checklist updates.
pub trait Presenter: Send + 'static {
    fn present(&mut self, snapshot: &Snapshot) -> io::Result<()>;
}

/// JSON object emitted per update by [`JsonLinesPresenter`].
#[derive(Debug, Serialize)]
pub struct ChecklistUpdate {
    pub steps: [ChecklistRow; 3],
    pub blink_count: u32,
    pub all_complete: bool,
}

impl From<&Snapshot> for ChecklistUpdate {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            steps: checklist(snapshot),
            blink_count: snapshot.blink_count,
            all_complete: snapshot.all_complete(),
        }
    }
}

/// One JSON object per line.
pub struct JsonLinesPresenter<W> {
    out: W,
}

impl<W> JsonLinesPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Presenter for JsonLinesPresenter<W> {
    fn present(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &ChecklistUpdate::from(snapshot))?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

/// Human-readable checklist, one block per update.
pub struct TablePresenter<W> {
    out: W,
}

impl<W> TablePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Presenter for TablePresenter<W> {
    fn present(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        for row in checklist(snapshot) {
            writeln!(self.out, "{row}")?;
        }
        if snapshot.all_complete() {
            writeln!(self.out, "liveness check passed")?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Present every distinct snapshot published on `updates` until the session ends.
pub fn spawn_presenter<P: Presenter>(
    mut updates: watch::Receiver<Snapshot>,
    mut presenter: P,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        let mut last: Option<Snapshot> = None;
        loop {
            let snapshot = *updates.borrow_and_update();
            if last != Some(snapshot) {
                presenter.present(&snapshot)?;
                last = Some(snapshot);
            }
            if updates.changed().await.is_err() {
                break;
            }
        }

        let snapshot = *updates.borrow();
        if last != Some(snapshot) {
            presenter.present(&snapshot)?;
        }
        Ok(())
    })
}
