// Async driver: executes session commands against the collaborators.
// The session is shared with the UI event handlers; no borrow is held across an await.
// See DESIGN.md: Concurrency

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::session::{Command, ScanSession};
use crate::services::{Detector, Grader, RouteStore};

/// Runs the detect -> grade -> save chain for a shared `ScanSession`.
pub struct ScanPipeline<D, G, S> {
    session: Rc<RefCell<ScanSession>>,
    detector: Rc<D>,
    grader: Rc<G>,
    store: Rc<S>,
}

impl<D, G, S> Clone for ScanPipeline<D, G, S> {
    fn clone(&self) -> Self {
        ScanPipeline {
            session: Rc::clone(&self.session),
            detector: Rc::clone(&self.detector),
            grader: Rc::clone(&self.grader),
            store: Rc::clone(&self.store),
        }
    }
}

impl<D, G, S> ScanPipeline<D, G, S>
where
    D: Detector,
    G: Grader,
    S: RouteStore,
{
    pub fn new(
        session: Rc<RefCell<ScanSession>>,
        detector: Rc<D>,
        grader: Rc<G>,
        store: Rc<S>,
    ) -> Self {
        ScanPipeline {
            session,
            detector,
            grader,
            store,
        }
    }

    pub fn session(&self) -> &Rc<RefCell<ScanSession>> {
        &self.session
    }

    /// Scan the held point and follow through grading and auto-save.
    pub async fn scan_route(&self) {
        let command = self.session.borrow_mut().scan_route();
        self.drive(command).await;
    }

    /// Retry a failed save.
    pub async fn retry_save(&self) {
        let command = self.session.borrow_mut().retry_save();
        self.drive(command).await;
    }

    /// Execute commands until the session stops producing them.
    pub async fn drive(&self, mut next: Option<Command>) {
        while let Some(command) = next.take() {
            next = match command {
                Command::Detect {
                    token,
                    image_uri,
                    request,
                } => {
                    debug!("dispatching detect for session {}", token.as_u64());
                    let result = self.detector.detect(&image_uri, &request).await;
                    self.session
                        .borrow_mut()
                        .on_detection_complete(token, result)
                }
                Command::Grade {
                    token,
                    image_uri,
                    route_name,
                } => {
                    debug!("dispatching grade for session {}", token.as_u64());
                    let result = self.grader.grade(&image_uri, route_name.as_deref()).await;
                    self.session.borrow_mut().on_grade_complete(token, result)
                }
                Command::Save { token, document } => {
                    debug!("dispatching save for session {}", token.as_u64());
                    let result = self.store.save(&document).await;
                    self.session.borrow_mut().on_save_complete(token, result);
                    None
                }
            };
        }
    }
}
