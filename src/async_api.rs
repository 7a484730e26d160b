use crate::compose::{merge_pdfs, PdfDocument};
use crate::readiness::PageReadinessCriteria;
use crate::renderer::{RenderOutcome, Renderer, RetryPolicy};
use crate::sizing::PageSizing;
use crate::{EngineFactory, Error, RenderTarget, Result};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Render(
        RenderTarget,
        PageReadinessCriteria,
        PageSizing,
        oneshot::Sender<Result<PdfDocument>>,
    ),
    RenderWithRetry(
        RenderTarget,
        PageReadinessCriteria,
        PageSizing,
        RetryPolicy,
        oneshot::Sender<RenderOutcome>,
    ),
    Merge(Vec<Option<PdfDocument>>, oneshot::Sender<Result<PdfDocument>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly renderer backed by a dedicated worker thread.
///
/// The worker owns the `Renderer` and runs one job at a time, so async
/// callers (an HTTP handler serving PDFs, say) never block the runtime on a
/// browser and never render two pages at once.
#[derive(Clone)]
pub struct RenderWorker {
    cmd_tx: Sender<Command>,
}

impl RenderWorker {
    /// Spawn the worker thread that owns `renderer`
    pub fn new<L>(renderer: Renderer<L>) -> Self
    where
        L: EngineFactory + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

        thread::spawn(move || {
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Render(target, readiness, sizing, resp) => {
                        let res = renderer.render_page_to_pdf(&target, &readiness, &sizing);
                        let _ = resp.send(res);
                    }
                    Command::RenderWithRetry(target, readiness, sizing, policy, resp) => {
                        let res = renderer.render_with_retry(&target, &readiness, &sizing, &policy);
                        let _ = resp.send(res);
                    }
                    Command::Merge(parts, resp) => {
                        let refs: Vec<Option<&PdfDocument>> = parts.iter().map(Option::as_ref).collect();
                        let _ = resp.send(merge_pdfs(&refs));
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
        });

        Self { cmd_tx }
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Other("Render worker has shut down".into()))
    }

    /// Render one page
    pub async fn render(
        &self,
        target: RenderTarget,
        readiness: PageReadinessCriteria,
        sizing: PageSizing,
    ) -> Result<PdfDocument> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Render(target, readiness, sizing, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Render canceled: {}", e)))?
    }

    /// Render one page with the bounded retry loop
    pub async fn render_with_retry(
        &self,
        target: RenderTarget,
        readiness: PageReadinessCriteria,
        sizing: PageSizing,
        policy: RetryPolicy,
    ) -> Result<RenderOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::RenderWithRetry(target, readiness, sizing, policy, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Render canceled: {}", e)))
    }

    /// Merge documents on the worker
    pub async fn merge(&self, parts: Vec<Option<PdfDocument>>) -> Result<PdfDocument> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Merge(parts, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Merge canceled: {}", e)))?
    }

    /// Stop the worker. Jobs already queued run first.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}
