use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use scribo_core::models::User;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::UserCache;
use crate::oauth::AuthorizationFlow;
use crate::services::AuthService;
use crate::token::TokenSignal;

/// Which resolution phase produced the current [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Tentative: any user shown comes from the local cache and has not been
    /// confirmed by the server yet.
    Resolving,
    /// Confirmed by a successful verify or login.
    Verified,
    /// Confirmed logged out.
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub user: Option<User>,
}

impl SessionState {
    fn resolving(user: Option<User>) -> Self {
        Self {
            phase: SessionPhase::Resolving,
            user,
        }
    }

    fn verified(user: User) -> Self {
        Self {
            phase: SessionPhase::Verified,
            user: Some(user),
        }
    }

    fn unauthenticated() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            user: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.phase != SessionPhase::Resolving
    }
}

/// Single source of truth for "who is signed in".
///
/// Reconciles three sources: the in-memory state, the local user cache and
/// the remote verify call. The cache is only ever an optimistic hint; once
/// [`bootstrap`](Self::bootstrap) resolves, the state reflects the server.
///
/// Must be used from within a Tokio runtime: logout and failed verification
/// spawn a detached invalidation task.
pub struct SessionController {
    auth: Arc<dyn AuthService>,
    cache: Arc<dyn UserCache>,
    token: Arc<dyn TokenSignal>,
    state: watch::Sender<SessionState>,
    /// Bumped by login and logout so an in-flight verify cannot overwrite
    /// an explicit user action.
    epoch: AtomicU64,
    /// Invalidation started by a failed verify, for [`settle`](Self::settle)
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        auth: Arc<dyn AuthService>,
        cache: Arc<dyn UserCache>,
        token: Arc<dyn TokenSignal>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::resolving(None));
        Self {
            auth,
            cache,
            token,
            state,
            epoch: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Resolve the session on startup.
    ///
    /// A cached user is published right away tagged
    /// [`SessionPhase::Resolving`]. Whenever the token signal is present the
    /// server is asked, even if the cache already has a user; without a
    /// token there is nothing to verify and any cached user is stale.
    pub async fn bootstrap(&self) -> SessionState {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let cached = self.read_cache();
        if cached.is_some() {
            self.state.send_replace(SessionState::resolving(cached.clone()));
        }

        if !self.token.is_present() {
            if cached.is_some() {
                tracing::debug!("Cached user without session token, discarding");
                self.forget_cache();
            }
            self.apply_if_current(epoch, SessionState::unauthenticated());
            return self.state();
        }

        match self.auth.verify().await {
            Ok(user) => {
                if self.apply_if_current(epoch, SessionState::verified(user.clone())) {
                    self.persist(&user);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session verification failed, signing out");
                if self.apply_if_current(epoch, SessionState::unauthenticated()) {
                    self.forget_cache();
                    let handle = self.spawn_invalidate();
                    *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                }
            }
        }
        self.state()
    }

    /// Wait for the invalidation a failed [`bootstrap`](Self::bootstrap)
    /// started in the background, if any. Hosts that exit right after
    /// bootstrapping call this so the server hears about it.
    pub async fn settle(&self) {
        let handle = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Session invalidation task failed");
            }
        }
    }

    /// Run the authorization-code flow and exchange the code for a session.
    ///
    /// Returns the signed-in user. On any failure the error is logged, the
    /// previous state is left untouched and `None` is returned.
    pub async fn login(&self, flow: &dyn AuthorizationFlow) -> Option<User> {
        let code = match flow.authorize().await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(error = %e, "Authorization flow failed");
                return None;
            }
        };

        let user = match self.auth.exchange_code(&code).await {
            Ok(profile) => User::from(profile),
            Err(e) => {
                tracing::error!(error = %e, "Login exchange failed");
                return None;
            }
        };

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(SessionState::verified(user.clone()));
        self.persist(&user);
        tracing::debug!(user_id = %user.id, "Signed in");
        Some(user)
    }

    /// Sign out locally right away, then tell the server in the background.
    ///
    /// Local state is cleared before this returns, whatever the server says.
    /// The returned handle lets short-lived hosts wait for the notification;
    /// dropping it does not cancel it.
    pub fn logout(&self) -> JoinHandle<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(SessionState::unauthenticated());
        self.forget_cache();
        self.spawn_invalidate()
    }

    fn apply_if_current(&self, epoch: u64, next: SessionState) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Session changed during verification, dropping result");
            return false;
        }
        self.state.send_replace(next);
        true
    }

    fn read_cache(&self) -> Option<User> {
        match self.cache.load() {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable user cache, ignoring it");
                self.forget_cache();
                None
            }
        }
    }

    fn persist(&self, user: &User) {
        if let Err(e) = self.cache.store(user) {
            tracing::warn!(error = %e, "Failed to cache user");
        }
    }

    fn forget_cache(&self) {
        if let Err(e) = self.cache.clear() {
            tracing::warn!(error = %e, "Failed to clear user cache");
        }
    }

    /// Fire-and-forget invalidation of the session held right now.
    ///
    /// The token is captured up front: the request targets that session even
    /// if a login adopts a new one meanwhile, and afterwards only that value
    /// is dropped locally. The outcome is only logged.
    fn spawn_invalidate(&self) -> JoinHandle<()> {
        let auth = Arc::clone(&self.auth);
        let token = Arc::clone(&self.token);
        let ending = token.current();
        tokio::spawn(async move {
            match auth.invalidate(ending.as_deref()).await {
                Ok(()) => tracing::debug!("Remote session invalidated"),
                Err(e) => tracing::warn!(error = %e, "Failed to invalidate remote session"),
            }
            if let Some(ending) = ending {
                if !token.clear_if(&ending) {
                    tracing::debug!("Session token replaced during invalidation, keeping it");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use scribo_core::error::{RemoteError, messages};
    use scribo_core::models::LoginProfile;
    use tokio::sync::oneshot;

    use super::*;
    use crate::cache::MemoryUserCache;
    use crate::cache::tests::ada;
    use crate::oauth::AuthorizeError;

    fn grace() -> User {
        User {
            id: "u-2".into(),
            name: "Grace".into(),
            email: "grace@example.com".into(),
            picture: String::new(),
        }
    }

    #[derive(Default)]
    struct FakeAuth {
        verify: Mutex<VecDeque<Result<User, RemoteError>>>,
        exchange: Mutex<VecDeque<Result<LoginProfile, RemoteError>>>,
        verify_gate: Mutex<Option<oneshot::Receiver<()>>>,
        invalidate_gate: Mutex<Option<oneshot::Receiver<Result<(), RemoteError>>>>,
        verify_calls: AtomicU64,
        invalidate_calls: AtomicU64,
        invalidated: Mutex<Vec<Option<String>>>,
    }

    impl FakeAuth {
        fn verifying(result: Result<User, RemoteError>) -> Self {
            let fake = Self::default();
            fake.verify.lock().unwrap().push_back(result);
            fake
        }

        /// Hold verify until the returned sender fires (or is dropped).
        fn hold_verify(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.verify_gate.lock().unwrap() = Some(rx);
            tx
        }
    }

    #[async_trait]
    impl AuthService for FakeAuth {
        async fn exchange_code(&self, code: &str) -> Result<LoginProfile, RemoteError> {
            assert_eq!(code, "the-code");
            self.exchange
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RemoteError::new(messages::LOGIN)))
        }

        async fn verify(&self) -> Result<User, RemoteError> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.verify_gate.lock().unwrap().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            let next = self.verify.lock().unwrap().pop_front();
            next.unwrap_or(Err(RemoteError::with_status(messages::GET_USER, 401)))
        }

        async fn invalidate(&self, token: Option<&str>) -> Result<(), RemoteError> {
            self.invalidate_calls.fetch_add(1, Ordering::SeqCst);
            self.invalidated
                .lock()
                .unwrap()
                .push(token.map(str::to_string));
            let gate = self.invalidate_gate.lock().unwrap().take();
            match gate {
                Some(rx) => rx.await.unwrap_or(Ok(())),
                None => Ok(()),
            }
        }
    }

    struct FakeToken(Mutex<Option<String>>);

    impl FakeToken {
        fn present() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Some("t-1".into()))))
        }

        fn absent() -> Arc<Self> {
            Arc::new(Self(Mutex::new(None)))
        }

        /// What the HTTP client does when a login response sets a cookie.
        fn adopt(&self, value: &str) {
            *self.0.lock().unwrap() = Some(value.into());
        }
    }

    impl TokenSignal for FakeToken {
        fn is_present(&self) -> bool {
            self.0.lock().unwrap().is_some()
        }

        fn current(&self) -> Option<String> {
            self.0.lock().unwrap().clone()
        }

        fn clear_if(&self, expected: &str) -> bool {
            let mut held = self.0.lock().unwrap();
            if held.as_deref() != Some(expected) {
                return false;
            }
            *held = None;
            true
        }
    }

    struct FixedFlow(Result<&'static str, ()>);

    #[async_trait]
    impl AuthorizationFlow for FixedFlow {
        async fn authorize(&self) -> Result<String, AuthorizeError> {
            self.0
                .map(str::to_string)
                .map_err(|()| AuthorizeError::MissingCode)
        }
    }

    fn controller(
        auth: &Arc<FakeAuth>,
        cache: &Arc<MemoryUserCache>,
        token: &Arc<FakeToken>,
    ) -> SessionController {
        SessionController::new(auth.clone(), cache.clone(), token.clone())
    }

    fn profile(user: &User) -> LoginProfile {
        LoginProfile {
            google_id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            picture: user.picture.clone(),
        }
    }

    #[tokio::test]
    async fn verify_result_supersedes_cached_user() {
        let auth = Arc::new(FakeAuth::verifying(Ok(grace())));
        let cache = Arc::new(MemoryUserCache::with_user(ada()));
        let token = FakeToken::present();
        let session = controller(&auth, &cache, &token);

        let state = session.bootstrap().await;

        assert_eq!(state, SessionState::verified(grace()));
        assert_eq!(cache.load().unwrap(), Some(grace()));
        assert_eq!(auth.verify_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_user_is_shown_tentatively_before_verify() {
        let auth = Arc::new(FakeAuth::verifying(Ok(ada())));
        let cache = Arc::new(MemoryUserCache::with_user(ada()));
        let release = auth.hold_verify();
        let session = Arc::new(controller(&auth, &cache, &FakeToken::present()));
        let mut rx = session.subscribe();

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.bootstrap().await }
        });

        let tentative = rx
            .wait_for(|s| s.user.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(tentative.phase, SessionPhase::Resolving);
        assert!(!tentative.is_confirmed());

        release.send(()).unwrap();
        assert_eq!(task.await.unwrap().phase, SessionPhase::Verified);
    }

    #[tokio::test]
    async fn failed_verify_signs_out_and_invalidates() {
        let auth = Arc::new(FakeAuth::verifying(Err(RemoteError::with_status(
            messages::GET_USER,
            401,
        ))));
        let cache = Arc::new(MemoryUserCache::with_user(ada()));
        let token = FakeToken::present();
        let session = controller(&auth, &cache, &token);

        let state = session.bootstrap().await;
        assert_eq!(state, SessionState::unauthenticated());
        assert!(cache.load().unwrap().is_none());

        session.settle().await;
        assert_eq!(
            auth.invalidated.lock().unwrap().as_slice(),
            [Some("t-1".to_string())]
        );
        assert!(!token.is_present());
    }

    #[tokio::test]
    async fn token_without_cache_fetches_user() {
        let auth = Arc::new(FakeAuth::verifying(Ok(grace())));
        let cache = Arc::new(MemoryUserCache::default());
        let session = controller(&auth, &cache, &FakeToken::present());

        assert_eq!(session.bootstrap().await.user, Some(grace()));
        assert_eq!(cache.load().unwrap(), Some(grace()));
    }

    #[tokio::test]
    async fn cache_without_token_is_stale() {
        let auth = Arc::new(FakeAuth::default());
        let cache = Arc::new(MemoryUserCache::with_user(ada()));
        let session = controller(&auth, &cache, &FakeToken::absent());

        assert_eq!(session.bootstrap().await, SessionState::unauthenticated());
        assert!(cache.load().unwrap().is_none());
        assert_eq!(auth.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nothing_to_go_on_stays_logged_out() {
        let auth = Arc::new(FakeAuth::default());
        let cache = Arc::new(MemoryUserCache::default());
        let session = controller(&auth, &cache, &FakeToken::absent());

        assert_eq!(session.bootstrap().await, SessionState::unauthenticated());
        assert_eq!(auth.verify_calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.invalidate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn login_sets_and_persists_user() {
        let auth = Arc::new(FakeAuth::default());
        auth.exchange.lock().unwrap().push_back(Ok(profile(&ada())));
        let cache = Arc::new(MemoryUserCache::default());
        let session = controller(&auth, &cache, &FakeToken::absent());
        session.bootstrap().await;

        let user = session.login(&FixedFlow(Ok("the-code"))).await;

        assert_eq!(user, Some(ada()));
        assert_eq!(session.state(), SessionState::verified(ada()));
        assert_eq!(cache.load().unwrap(), Some(ada()));
    }

    #[tokio::test]
    async fn failed_exchange_leaves_state_untouched() {
        let auth = Arc::new(FakeAuth::verifying(Ok(grace())));
        auth.exchange
            .lock()
            .unwrap()
            .push_back(Err(RemoteError::with_status(messages::LOGIN, 401)));
        let cache = Arc::new(MemoryUserCache::default());
        let session = controller(&auth, &cache, &FakeToken::present());
        let before = session.bootstrap().await;

        assert_eq!(session.login(&FixedFlow(Ok("the-code"))).await, None);
        assert_eq!(session.state(), before);
        assert_eq!(cache.load().unwrap(), Some(grace()));
    }

    #[tokio::test]
    async fn failed_authorization_never_calls_exchange() {
        let auth = Arc::new(FakeAuth::default());
        let cache = Arc::new(MemoryUserCache::default());
        let session = controller(&auth, &cache, &FakeToken::absent());
        session.bootstrap().await;

        assert_eq!(session.login(&FixedFlow(Err(()))).await, None);
        assert_eq!(session.state(), SessionState::unauthenticated());
    }

    #[tokio::test]
    async fn logout_clears_synchronously_while_invalidate_pending() {
        let auth = Arc::new(FakeAuth::verifying(Ok(ada())));
        let (release, gate) = oneshot::channel();
        *auth.invalidate_gate.lock().unwrap() = Some(gate);
        let cache = Arc::new(MemoryUserCache::default());
        let token = FakeToken::present();
        let session = controller(&auth, &cache, &token);
        session.bootstrap().await;
        assert!(session.user().is_some());

        let pending = session.logout();

        assert_eq!(session.state(), SessionState::unauthenticated());
        assert!(cache.load().unwrap().is_none());
        assert!(token.is_present(), "token kept until the server was told");

        release
            .send(Err(RemoteError::with_status(messages::INVALIDATE_USER, 500)))
            .unwrap();
        pending.await.unwrap();
        assert_eq!(session.state(), SessionState::unauthenticated());
        assert!(!token.is_present());
    }

    #[tokio::test]
    async fn login_during_invalidation_keeps_new_session() {
        let auth = Arc::new(FakeAuth::verifying(Ok(ada())));
        auth.exchange.lock().unwrap().push_back(Ok(profile(&grace())));
        let (release, gate) = oneshot::channel();
        *auth.invalidate_gate.lock().unwrap() = Some(gate);
        let cache = Arc::new(MemoryUserCache::default());
        let token = FakeToken::present();
        let session = controller(&auth, &cache, &token);
        session.bootstrap().await;

        let pending = session.logout();
        token.adopt("t-2");
        assert_eq!(session.login(&FixedFlow(Ok("the-code"))).await, Some(grace()));

        release.send(Ok(())).unwrap();
        pending.await.unwrap();

        assert_eq!(
            auth.invalidated.lock().unwrap().as_slice(),
            [Some("t-1".to_string())],
            "only the old session is invalidated"
        );
        assert_eq!(token.current().as_deref(), Some("t-2"));
        assert_eq!(session.state(), SessionState::verified(grace()));
    }

    #[tokio::test]
    async fn settle_without_failed_verify_returns() {
        let auth = Arc::new(FakeAuth::verifying(Ok(ada())));
        let cache = Arc::new(MemoryUserCache::default());
        let session = controller(&auth, &cache, &FakeToken::present());
        session.bootstrap().await;

        session.settle().await;
        assert_eq!(auth.invalidate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logout_during_verify_wins() {
        let auth = Arc::new(FakeAuth::verifying(Ok(ada())));
        let release = auth.hold_verify();
        let cache = Arc::new(MemoryUserCache::default());
        let session = Arc::new(controller(&auth, &cache, &FakeToken::present()));

        let bootstrap = tokio::spawn({
            let session = session.clone();
            async move { session.bootstrap().await }
        });
        while auth.verify_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        session.logout().await.unwrap();
        release.send(()).unwrap();

        assert_eq!(bootstrap.await.unwrap(), SessionState::unauthenticated());
        assert!(cache.load().unwrap().is_none());
    }
}
