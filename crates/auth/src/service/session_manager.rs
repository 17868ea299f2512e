//! Login, refresh rotation, authentication, and session termination.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{Span, field, info, instrument};

use warden_core::{
    AdminId, AuthError, AuthResult, RequestContext, ResultExt, SessionId, codes,
};

use super::AuthDeps;
use crate::uow::finish;
use crate::{
    ActorRef, ActorType, Admin, AdminFilter, Session, SessionFilter, UnitOfWork,
};

#[derive(Clone, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
    pub ip_address: String,
    pub user_agent: String,
}

impl core::fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginInput")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ip_address", &self.ip_address)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutput {
    pub admin: Admin,
    pub session: Session,
}

fn invalid_credentials() -> AuthError {
    AuthError::token_invalid(codes::INVALID_CREDENTIALS, "invalid username or password")
}

fn actor_disabled() -> AuthError {
    AuthError::unauthorized(codes::ACTOR_DISABLED, "account is disabled")
}

fn session_not_found(id: SessionId) -> AuthError {
    AuthError::not_found(codes::SESSION_NOT_FOUND, format!("session {id} not found"))
}

fn unassigned_session_id() -> AuthError {
    AuthError::persistence("session store did not assign an id")
}

/// Session state machine: ACTIVE -> ROTATED -> TERMINATED.
#[derive(Clone)]
pub struct SessionManager {
    deps: AuthDeps,
}

impl SessionManager {
    pub fn new(deps: AuthDeps) -> Self {
        Self { deps }
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown username and wrong password fail identically with
    /// `INVALID_CREDENTIALS`; nothing is written in either case.
    #[instrument(
        skip(self, ctx, input),
        fields(
            username = %input.username,
            admin_id = field::Empty,
            session_id = field::Empty
        ),
        err(level = "warn")
    )]
    pub async fn login(&self, ctx: &RequestContext, input: LoginInput) -> AuthResult<LoginOutput> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = self.login_in(&*uow, &input).await;
        let out = finish(uow, result).await.context("login")?;

        let span = Span::current();
        span.record("admin_id", field::display(out.admin.id));
        if let Some(id) = out.session.id {
            span.record("session_id", id.get());
        }
        info!("admin logged in");
        Ok(out)
    }

    async fn login_in(&self, uow: &dyn UnitOfWork, input: &LoginInput) -> AuthResult<LoginOutput> {
        let Some(mut admin) = uow
            .admins()
            .first_or_nil(&AdminFilter::by_username(&input.username))
            .await?
        else {
            return Err(invalid_credentials());
        };

        if !self.deps.hasher.compare(&input.password, &admin.password_hash).await {
            return Err(invalid_credentials());
        }
        if !admin.is_active {
            return Err(actor_disabled());
        }

        let actor = admin.actor();
        let refresh = self.deps.tokens.generate_refresh_token()?;
        let mut session = uow
            .sessions()
            .create(Session::open(&actor, refresh, &input.ip_address, &input.user_agent))
            .await
            .context("create session")?;

        let session_id = session.id.ok_or_else(unassigned_session_id)?;
        let access = self.deps.tokens.generate_access_token(session_id, &actor)?;
        session.bind_access_token(access);
        let session = uow.sessions().update(session).await.context("bind access token")?;

        admin.last_active_at = Some(Utc::now());
        let admin = uow.admins().update(admin).await.context("touch last_active_at")?;

        Ok(LoginOutput { admin, session })
    }

    /// Exchange a refresh token for a new token pair. Both tokens always rotate.
    #[instrument(skip(self, ctx, refresh_token), fields(session_id = field::Empty), err(level = "warn"))]
    pub async fn refresh(&self, ctx: &RequestContext, refresh_token: &str) -> AuthResult<Session> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = self.refresh_in(&*uow, refresh_token).await;
        let session = finish(uow, result).await.context("refresh token")?;
        if let Some(id) = session.id {
            Span::current().record("session_id", id.get());
        }
        Ok(session)
    }

    async fn refresh_in(&self, uow: &dyn UnitOfWork, refresh_token: &str) -> AuthResult<Session> {
        let Some(mut session) = uow
            .sessions()
            .first_or_nil(&SessionFilter::by_refresh_token(refresh_token))
            .await?
        else {
            return Err(AuthError::token_invalid(
                codes::INVALID_REFRESH_TOKEN,
                "invalid refresh token",
            ));
        };

        let now = Utc::now();
        if session.refresh_expired(now) {
            return Err(AuthError::token_expired(
                codes::REFRESH_TOKEN_EXPIRED,
                "refresh token has expired",
            ));
        }

        let actor = session.actor();
        ensure_actor_active(uow, &actor).await?;

        let session_id = session.id.ok_or_else(unassigned_session_id)?;
        let refresh = self.deps.tokens.generate_refresh_token()?;
        let access = self.deps.tokens.generate_access_token(session_id, &actor)?;
        session.rotate(access, refresh, now);

        uow.sessions().update(session).await.context("rotate session tokens")
    }

    /// Resolve the live session bound to an access token. Read-only.
    #[instrument(skip(self, ctx, access_token), err(level = "debug"))]
    pub async fn authenticate(&self, ctx: &RequestContext, access_token: &str) -> AuthResult<Session> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let Some(session) = uow
                .sessions()
                .first_or_nil(&SessionFilter::by_access_token(access_token))
                .await?
            else {
                return Err(AuthError::token_invalid(
                    codes::INVALID_ACCESS_TOKEN,
                    "invalid access token",
                ));
            };
            if session.access_expired(Utc::now()) {
                return Err(AuthError::token_expired(
                    codes::ACCESS_TOKEN_EXPIRED,
                    "access token has expired",
                ));
            }
            Ok(session)
        }
        .await;
        finish(uow, result).await.context("authenticate")
    }

    #[instrument(skip(self, ctx), fields(session_id = session_id.get()), err)]
    pub async fn logout(&self, ctx: &RequestContext, session_id: SessionId) -> AuthResult<()> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let session = load_session(&*uow, session_id).await?;
            uow.sessions().delete(&session).await
        }
        .await;
        finish(uow, result).await.context("logout")
    }

    /// Logout on behalf of `caller`. Only superadmins may end someone else's
    /// session.
    #[instrument(
        skip(self, ctx, caller),
        fields(session_id = session_id.get(), caller = %caller),
        err
    )]
    pub async fn delete_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
        caller: &ActorRef,
        caller_is_superadmin: bool,
    ) -> AuthResult<()> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let session = load_session(&*uow, session_id).await?;
            if !caller_is_superadmin && !session.is_owned_by(caller) {
                return Err(AuthError::unauthorized(
                    codes::PERMISSION_DENIED,
                    "cannot delete another actor's session",
                ));
            }
            uow.sessions().delete(&session).await
        }
        .await;
        finish(uow, result).await.context("delete session")
    }

    /// "Log out everywhere". Returns how many sessions were deleted.
    #[instrument(skip(self, ctx), fields(deleted = field::Empty), err)]
    pub async fn delete_all_sessions_for_actor(
        &self,
        ctx: &RequestContext,
        actor_type: &str,
        actor_id: &str,
    ) -> AuthResult<u64> {
        let actor = ActorRef::parse(actor_type, actor_id)?;
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = terminate_sessions(&*uow, &actor).await;
        let deleted = finish(uow, result).await.context("delete all sessions")?;
        Span::current().record("deleted", deleted);
        info!(actor = %actor, deleted, "terminated all sessions for actor");
        Ok(deleted)
    }
}

async fn load_session(uow: &dyn UnitOfWork, id: SessionId) -> AuthResult<Session> {
    uow.sessions()
        .first_or_nil(&SessionFilter::by_id(id))
        .await?
        .ok_or_else(|| session_not_found(id))
}

/// Delete every session owned by `actor` inside `uow`.
pub(crate) async fn terminate_sessions(uow: &dyn UnitOfWork, actor: &ActorRef) -> AuthResult<u64> {
    let sessions = uow.sessions().list(&SessionFilter::by_actor(actor)).await?;
    if sessions.is_empty() {
        return Ok(0);
    }
    uow.sessions()
        .bulk_delete(&sessions)
        .await
        .context("bulk delete sessions")?;
    Ok(sessions.len() as u64)
}

/// Admins must still exist and be active. Other actor types have no account
/// store here and are accepted.
async fn ensure_actor_active(uow: &dyn UnitOfWork, actor: &ActorRef) -> AuthResult<()> {
    if actor.actor_type != ActorType::Admin {
        return Ok(());
    }
    let id: AdminId = actor.actor_id.as_str().parse().map_err(|_| actor_disabled())?;
    match uow.admins().first_or_nil(&AdminFilter::by_id(id)).await? {
        Some(admin) if admin.is_active => Ok(()),
        _ => Err(actor_disabled()),
    }
}
