use std::path::{Path, PathBuf};

use rand::Rng;

/// Uniquely named directory under the system temp dir, removed on drop.
pub(crate) struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn new(label: &str) -> Self {
        let mut suffix = [0u8; 8];
        rand::rng().fill(&mut suffix[..]);
        let path = std::env::temp_dir().join(format!("retro-host-{label}-{}", hex::encode(suffix)));
        std::fs::create_dir_all(&path).expect("create scratch dir");
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Tracing layer that records every event it sees.
#[derive(Clone, Default)]
pub(crate) struct EventCounter {
    events: std::sync::Arc<parking_lot::Mutex<Vec<(tracing::Level, String)>>>,
}

impl EventCounter {
    /// Runs `f` with this counter as the thread's only subscriber.
    pub(crate) fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        use tracing_subscriber::layer::SubscriberExt;
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::with_default(subscriber, f)
    }

    pub(crate) fn count(&self, level: tracing::Level) -> usize {
        self.events.lock().iter().filter(|(l, _)| *l == level).count()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.events.lock().iter().map(|(_, m)| m.clone()).collect()
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCounter {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut message = MessageVisitor(String::new());
        event.record(&mut message);
        self.events
            .lock()
            .push((*event.metadata().level(), message.0));
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

/// A session context over a scratch root, with both of its channels.
pub(crate) struct TestContext {
    pub(crate) ctx: std::sync::Arc<crate::session::context::SessionContext>,
    pub(crate) commands: crate::queue::CommandReceiver,
    pub(crate) events: crossbeam_channel::Receiver<crate::session::SessionEvent>,
    pub(crate) dir: ScratchDir,
}

impl TestContext {
    pub(crate) fn new(label: &str) -> Self {
        let dir = ScratchDir::new(label);
        let config = crate::config::FrontendConfig::new(dir.path().join("data"));
        let (sender, commands) = crate::queue::channel();
        let (event_tx, events) = crossbeam_channel::unbounded();
        let ctx = crate::session::context::SessionContext::new(
            config,
            &dir.path().join("fake_libretro.so"),
            std::sync::Arc::new(crate::input::InputState::new()),
            sender,
            event_tx,
        );
        Self {
            ctx: std::sync::Arc::new(ctx),
            commands,
            events,
            dir,
        }
    }
}
