//! Controller task
//!
//! Every controller runs on its own tokio task. The task owns the
//! [`Controller`] and is the only code that touches it, so transitions are
//! serialized: state changes, the timer, the poll interval and lifecycle
//! commands all wake the same loop, one at a time.

use crate::engine::{Controller, Machine, StateChanges};
use crate::error::{ControllerError, ControllerResult};
use crate::listeners::ControllerView;
use smartify_core::{Event, StateChangedData};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

enum Command {
    /// Tear down and set up again
    Reload(oneshot::Sender<()>),
    /// Tear down and stop the task
    Shutdown(oneshot::Sender<()>),
}

/// What woke the controller loop
enum Wake {
    Command(Option<Command>),
    Changed(Event<StateChangedData>),
    Timer,
    Poll,
}

/// Handle to a running controller task
pub struct ControllerHandle {
    name: String,
    view: ControllerView,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Spawn the controller and wait until its setup has finished
    pub async fn start<M: Machine>(controller: Controller<M>) -> Self {
        let view = controller.view();
        let (commands, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(run(controller, rx, ready_tx));
        if ready_rx.await.is_err() {
            error!(controller = %view.name(), "Controller task exited during setup");
        }

        Self {
            name: view.name(),
            view,
            commands,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn view(&self) -> ControllerView {
        self.view.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Tear the controller down and set it up again from scratch
    pub async fn reload(&self) -> ControllerResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Reload(ack))?;
        done.await.map_err(|_| ControllerError::Stopped(self.name.clone()))
    }

    /// Tear the controller down and wait for its task to exit
    pub async fn shutdown(self) -> ControllerResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Shutdown(ack))?;
        done.await.map_err(|_| ControllerError::Stopped(self.name.clone()))?;

        if let Err(err) = self.task.await {
            error!(controller = %self.name, error = %err, "Controller task failed");
        }
        Ok(())
    }

    fn send(&self, command: Command) -> ControllerResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ControllerError::Stopped(self.name.clone()))
    }
}

async fn run<M: Machine>(
    mut controller: Controller<M>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    ready: oneshot::Sender<()>,
) {
    let mut changes = controller.setup().await;
    let _ = ready.send(());

    loop {
        match next_wake(&controller, &mut commands, &mut changes).await {
            Wake::Command(Some(Command::Reload(ack))) => {
                controller.teardown();
                changes = controller.setup().await;
                let _ = ack.send(());
            }
            Wake::Command(Some(Command::Shutdown(ack))) => {
                controller.teardown();
                let _ = ack.send(());
                break;
            }
            Wake::Command(None) => {
                // Every handle is gone
                controller.teardown();
                break;
            }
            Wake::Changed(event) => controller.handle_state_changed(event).await,
            Wake::Timer => controller.expire_timer().await,
            Wake::Poll => controller.poll().await,
        }
    }

    debug!(controller = %controller.engine().name(), "Controller task exited");
}

/// Commands first, then due deadlines, then state changes
///
/// A burst of sensor updates cannot hold back an expired timer.
async fn next_wake<M: Machine>(
    controller: &Controller<M>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    changes: &mut Option<StateChanges>,
) -> Wake {
    let timer = controller.engine().timer().deadline();
    let poll = controller.engine().poll().deadline();

    tokio::select! {
        biased;
        command = commands.recv() => Wake::Command(command),
        _ = sleep_until(timer) => Wake::Timer,
        _ = sleep_until(poll) => Wake::Poll,
        Some(event) = next_change(changes) => Wake::Changed(event),
    }
}

/// Next event from the subscription, pending forever once it has closed
async fn next_change(changes: &mut Option<StateChanges>) -> Option<Event<StateChangedData>> {
    let Some(rx) = changes else {
        return std::future::pending().await;
    };
    let event = rx.recv().await;
    if event.is_none() {
        *changes = None;
    }
    event
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
