use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use qwatch_model::{SessionId, TaskId};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, trace};

use crate::{
    config::SupervisorConfig,
    engine::ExecutionEngine,
    error::CoreError,
    event::TaskObserver,
    messages::SessionMessages,
    monitor::Monitor,
    registry::TaskRegistry,
    supervisor::TaskSupervisor,
};

/// Elevated-privilege flag of a session, shared with the supervisor's failure reporter.
#[derive(Debug, Clone, Default)]
pub struct Privileges(Arc<AtomicBool>);

impl Privileges {
    pub fn is_elevated(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set_elevated(&self, elevated: bool) {
        self.0.store(elevated, Ordering::Relaxed);
    }
}

/// One user session: its task supervisor, message sets and privileges.
pub struct Session {
    id: SessionId,
    messages: Arc<SessionMessages>,
    privileges: Privileges,
    tasks: TaskSupervisor,
    last_seen: Mutex<Instant>,
}

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn messages(&self) -> &Arc<SessionMessages> {
        &self.messages
    }

    pub fn tasks(&self) -> &TaskSupervisor {
        &self.tasks
    }

    pub fn is_superuser(&self) -> bool {
        self.privileges.is_elevated()
    }

    pub fn set_superuser(&self, superuser: bool) {
        self.privileges.set_elevated(superuser);
    }

    /// Time since the session was last looked up through its store.
    pub fn idle_for(&self) -> Duration {
        self.last_seen().elapsed()
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn last_seen(&self) -> Instant {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Directory of live sessions.
///
/// All sessions share one task id counter, so task ids are unique across the whole store.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: SupervisorConfig,
    engine: Option<Arc<dyn ExecutionEngine>>,
    observers: Vec<Arc<dyn TaskObserver>>,
    task_ids: Arc<AtomicU64>,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

pub struct SessionStoreBuilder {
    config: SupervisorConfig,
    engine: Option<Arc<dyn ExecutionEngine>>,
    observers: Vec<Arc<dyn TaskObserver>>,
}

impl SessionStoreBuilder {
    pub fn with_engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_observers(mut self, observers: Vec<Arc<dyn TaskObserver>>) -> Self {
        self.observers.extend(observers);
        self
    }

    pub fn build(self) -> SessionStore {
        SessionStore {
            inner: Arc::new(StoreInner {
                config: self.config,
                engine: self.engine,
                observers: self.observers,
                task_ids: Arc::new(AtomicU64::new(0)),
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }
}

impl SessionStore {
    pub fn builder(config: SupervisorConfig) -> SessionStoreBuilder {
        SessionStoreBuilder {
            config,
            engine: None,
            observers: Vec::new(),
        }
    }

    /// Create a session with a fresh random id.
    pub fn open(&self) -> Arc<Session> {
        self.open_with_id(SessionId::from(uuid::Uuid::new_v4().to_string()))
    }

    /// Return the session with this id, creating it if needed.
    pub fn open_with_id(&self, id: SessionId) -> Arc<Session> {
        if let Some(session) = self.get(&id) {
            return session;
        }
        let mut sessions = self.write();
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(self.new_session(id.clone())));
        debug!(session = %id, "session opened");
        Arc::clone(session)
    }

    /// Look up a session and mark it as used.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        let session = self.read().get(id).cloned()?;
        session.touch();
        Some(session)
    }

    pub fn require(&self, id: &SessionId) -> Result<Arc<Session>, CoreError> {
        self.get(id)
            .ok_or_else(|| CoreError::SessionNotFound(id.clone()))
    }

    /// Drop a session and ask its live tasks to stop.
    pub fn close(&self, id: &SessionId) -> Option<Arc<Session>> {
        let session = self.write().remove(id)?;
        let cancelled = session.tasks().cancel_all();
        info!(session = %id, cancelled, "session closed");
        Some(session)
    }

    /// Close every session that has not been looked up for at least `idle`.
    pub fn expire_idle(&self, idle: Duration) -> Vec<SessionId> {
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.write();
            let ids: Vec<SessionId> = sessions
                .values()
                .filter(|session| session.idle_for() >= idle)
                .map(|session| session.id().clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        expired
            .iter()
            .map(|session| {
                let cancelled = session.tasks().cancel_all();
                info!(session = %session.id(), cancelled, idle_ms = session.idle_for().as_millis() as u64, "idle session expired");
                session.id().clone()
            })
            .collect()
    }

    /// Run [`expire_idle`](Self::expire_idle) every `every` until the store is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_expiry(&self, idle: Duration, every: Duration) -> JoinHandle<()> {
        let store: Weak<StoreInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = time::interval(every.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = store.upgrade() else {
                    trace!("session store dropped; expiry stopped");
                    return;
                };
                let expired = SessionStore { inner }.expire_idle(idle);
                if !expired.is_empty() {
                    debug!(count = expired.len(), "idle sessions swept");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Locate a task in any session.
    pub fn find_task(&self, task: &TaskId) -> Option<(Arc<Session>, Monitor)> {
        self.read().values().find_map(|session| {
            session
                .tasks()
                .get_monitor(task)
                .map(|monitor| (Arc::clone(session), monitor))
        })
    }

    /// Administrative cancellation of a task owned by any session.
    pub fn cancel_any(&self, task: &TaskId) -> Result<SessionId, CoreError> {
        let (session, _) = self
            .find_task(task)
            .ok_or_else(|| CoreError::TaskNotFound(task.clone()))?;
        session.tasks().request_cancel(task)?;
        info!(session = %session.id(), %task, "administrative cancellation requested");
        Ok(session.id().clone())
    }

    fn new_session(&self, id: SessionId) -> Session {
        let messages = Arc::new(SessionMessages::new());
        let privileges = Privileges::default();
        let mut builder = TaskSupervisor::builder(self.inner.config.clone())
            .with_registry(TaskRegistry::with_counter(Arc::clone(&self.inner.task_ids)))
            .with_messages(messages.clone())
            .with_privileges(privileges.clone())
            .with_observers(self.inner.observers.clone())
            .with_session(id.clone());
        if let Some(engine) = &self.inner.engine {
            builder = builder.with_engine(Arc::clone(engine));
        }
        Session {
            id,
            messages,
            privileges,
            tasks: builder.build(),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.inner.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.inner.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActionError, TokenTable};
    use qwatch_model::{MessageScope, Outcome};
    use std::time::Duration;

    fn store() -> SessionStore {
        let config = SupervisorConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_grace_period(Duration::from_millis(200));
        SessionStore::builder(config)
            .with_engine(Arc::new(TokenTable::new()))
            .build()
    }

    fn wait_for_cancel(ctx: &crate::TaskContext) -> Result<(), ActionError> {
        for _ in 0..500 {
            if ctx.cancel_requested() {
                return Err(crate::EngineError::Aborted.into());
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    #[test]
    fn open_with_id_is_idempotent() {
        let store = store();
        let a = store.open_with_id(SessionId::from("s1"));
        let b = store.open_with_id(SessionId::from("s1"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn privileges_are_per_session() {
        let store = store();
        let admin = store.open();
        let user = store.open();
        admin.set_superuser(true);

        assert!(admin.is_superuser());
        assert!(!user.is_superuser());
    }

    #[tokio::test]
    async fn task_ids_are_unique_across_sessions() {
        let store = store();
        let a = store.open();
        let b = store.open();

        let ia = a.tasks().start_task(|_| Ok(()), None).unwrap();
        let ib = b.tasks().start_task(|_| Ok(()), None).unwrap();
        assert_ne!(ia, ib);
    }

    #[tokio::test]
    async fn admin_can_cancel_a_task_in_another_session() {
        let store = store();
        let user = store.open();
        let task = user.tasks().start_task(wait_for_cancel, None).unwrap();

        let owner = store.cancel_any(&task).unwrap();
        assert_eq!(&owner, user.id());

        let outcome = user.tasks().wait_for_outcome(&task).await.unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert!(user.messages().is_empty(MessageScope::Errors));
    }

    #[tokio::test]
    async fn cancel_any_unknown_task_is_not_found() {
        let store = store();
        store.open();
        assert!(matches!(
            store.cancel_any(&TaskId::from("404")),
            Err(CoreError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn closing_a_session_cancels_its_tasks() {
        let store = store();
        let session = store.open();
        let task = session.tasks().start_task(wait_for_cancel, None).unwrap();
        let monitor = session.tasks().get_monitor(&task).unwrap();

        let closed = store.close(session.id()).unwrap();
        assert!(store.get(closed.id()).is_none());

        let outcome = tokio::time::timeout(Duration::from_secs(2), monitor.wait()).await.unwrap().unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn idle_sessions_expire_and_cancel_their_tasks() {
        let store = store();
        let idle = store.open();
        let busy = store.open();
        let task = idle.tasks().start_task(wait_for_cancel, None).unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(busy.id()).is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.expire_idle(Duration::from_millis(50)), vec![idle.id().clone()]);
        assert!(store.get(idle.id()).is_none());
        assert_eq!(store.len(), 1);

        let outcome = idle.tasks().wait_for_outcome(&task).await.unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn expiry_runs_in_the_background_until_the_store_is_dropped() {
        let store = store();
        store.open();
        let sweeper = store.spawn_expiry(Duration::from_millis(30), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.is_empty());

        drop(store);
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper stops with its store")
            .unwrap();
    }
}
