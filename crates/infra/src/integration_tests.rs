//! Integration tests for the authorization services over the in-memory store.
//!
//! Verifies:
//! - Login, refresh, authenticate and logout drive the session lifecycle
//! - Replace-all RBAC assignments and effective-permission resolution
//! - At least one active superadmin always remains
//! - A failed operation leaves no partial writes behind

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    use warden_auth::service::{
        CreateAdminInput, CreateRoleInput, CreateSuperadminInput, ListAdminsInput, ListRolesInput,
        LoginInput, LoginOutput, SetActorPermissionsInput, SetActorRolesInput, UpdateAdminInput,
        UpdateRoleInput,
    };
    use warden_auth::{
        ActorPermissionFilter, ActorRef, ActorRoleFilter, Admin, AdminFilter, AuthDeps,
        AuthServices, Permission, Role, RoleNameScope, RolePermissionFilter, SessionFilter,
        Repo, UowFactory,
    };
    use warden_core::{AuthResult, ErrorKind, RequestContext, RoleId, codes};

    use crate::memory::{InMemoryStore, StoreOp};
    use crate::testing::{PlainHasher, SequentialTokenIssuer};

    const PASSWORD: &str = "pw12345";

    struct Harness {
        store: InMemoryStore,
        svc: AuthServices,
        ctx: RequestContext,
    }

    fn setup() -> Harness {
        setup_with(SequentialTokenIssuer::default(), RoleNameScope::Global)
    }

    fn setup_with(tokens: SequentialTokenIssuer, scope: RoleNameScope) -> Harness {
        let store = InMemoryStore::new();
        let deps = AuthDeps::new(
            Arc::new(store.clone()),
            Arc::new(PlainHasher),
            Arc::new(tokens),
        )
        .with_role_name_scope(scope);
        Harness {
            store,
            svc: AuthServices::new(deps),
            ctx: RequestContext::background(),
        }
    }

    impl Harness {
        async fn superadmin(&self, username: &str) -> Admin {
            self.svc
                .bootstrap
                .create_superadmin(
                    &self.ctx,
                    CreateSuperadminInput {
                        username: username.to_string(),
                        password: PASSWORD.to_string(),
                    },
                )
                .await
                .unwrap()
        }

        async fn admin(&self, username: &str) -> Admin {
            self.svc
                .admins
                .create_admin(
                    &self.ctx,
                    CreateAdminInput {
                        username: username.to_string(),
                        password: PASSWORD.to_string(),
                        is_superadmin: false,
                    },
                )
                .await
                .unwrap()
        }

        async fn login(&self, username: &str, password: &str) -> AuthResult<LoginOutput> {
            self.svc
                .sessions
                .login(
                    &self.ctx,
                    LoginInput {
                        username: username.to_string(),
                        password: password.to_string(),
                        ip_address: "127.0.0.1".to_string(),
                        user_agent: "integration-test".to_string(),
                    },
                )
                .await
        }

        async fn role(&self, name: &str, actor_type: &str) -> AuthResult<Role> {
            self.svc
                .rbac
                .create_role(
                    &self.ctx,
                    CreateRoleInput {
                        name: name.to_string(),
                        actor_type: actor_type.to_string(),
                    },
                )
                .await
        }

        async fn session_count(&self) -> u64 {
            let mut uow = self.store.new_uow(&self.ctx).await.unwrap();
            let n = uow.sessions().count(&SessionFilter::default()).await.unwrap();
            uow.discard_unapplied().await;
            n
        }

        async fn admin_count(&self) -> u64 {
            let mut uow = self.store.new_uow(&self.ctx).await.unwrap();
            let n = uow.admins().count(&AdminFilter::default()).await.unwrap();
            uow.discard_unapplied().await;
            n
        }

        async fn role_permission_count(&self, role_id: RoleId) -> u64 {
            let mut uow = self.store.new_uow(&self.ctx).await.unwrap();
            let n = uow
                .role_permissions()
                .count(&RolePermissionFilter::by_role(role_id))
                .await
                .unwrap();
            uow.discard_unapplied().await;
            n
        }

        async fn actor_role_count(&self, actor: &ActorRef) -> u64 {
            let mut uow = self.store.new_uow(&self.ctx).await.unwrap();
            let n = uow
                .actor_roles()
                .count(&ActorRoleFilter::by_actor(actor))
                .await
                .unwrap();
            uow.discard_unapplied().await;
            n
        }

        async fn actor_permission_count(&self, actor: &ActorRef) -> u64 {
            let mut uow = self.store.new_uow(&self.ctx).await.unwrap();
            let n = uow
                .actor_permissions()
                .count(&ActorPermissionFilter::by_actor(actor))
                .await
                .unwrap();
            uow.discard_unapplied().await;
            n
        }
    }

    fn perms(names: &[&str]) -> BTreeSet<Permission> {
        names.iter().map(|n| Permission::from(n.to_string())).collect()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn id_str(admin: &Admin) -> String {
        admin.id.to_string()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn login_binds_a_session_with_both_tokens() {
        let h = setup();
        let alice = h.superadmin("alice").await;

        let out = h.login("alice", PASSWORD).await.unwrap();
        let now = Utc::now();

        assert_eq!(out.admin.id, alice.id);
        assert!(out.admin.last_active_at.is_some());
        assert!(out.session.id.is_some());
        assert!(out.session.is_owned_by(&alice.actor()));
        assert!(!out.session.refresh_token.is_empty());
        assert!(out.session.access_token.as_deref().is_some_and(|t| !t.is_empty()));
        assert!(out.session.access_token_expires_at.is_some_and(|at| at > now));
        assert!(out.session.refresh_token_expires_at > now);

        let access = out.session.access_token.clone().unwrap();
        let authed = h.svc.sessions.authenticate(&h.ctx, &access).await.unwrap();
        assert_eq!(authed.id, out.session.id);
        assert_eq!(h.session_count().await, 1);
    }

    #[tokio::test]
    async fn bad_credentials_create_no_session() {
        let h = setup();
        h.superadmin("alice").await;

        let err = h.login("alice", "wrong-password").await.unwrap_err();
        assert!(err.is(codes::INVALID_CREDENTIALS));
        assert_eq!(err.kind(), ErrorKind::TokenInvalid);

        let err = h.login("nobody", PASSWORD).await.unwrap_err();
        assert!(err.is(codes::INVALID_CREDENTIALS));

        assert_eq!(h.session_count().await, 0);
    }

    #[tokio::test]
    async fn disabled_admin_cannot_log_in() {
        let h = setup();
        h.superadmin("root").await;
        let bob = h.admin("bob").await;

        h.svc.admins.disable_admin(&h.ctx, bob.id).await.unwrap();

        let err = h.login("bob", PASSWORD).await.unwrap_err();
        assert!(err.is(codes::ACTOR_DISABLED));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(h.session_count().await, 0);
    }

    #[tokio::test]
    async fn refresh_rotates_both_tokens() {
        let h = setup();
        h.superadmin("alice").await;
        let first = h.login("alice", PASSWORD).await.unwrap().session;
        let old_access = first.access_token.clone().unwrap();

        let rotated = h
            .svc
            .sessions
            .refresh(&h.ctx, &first.refresh_token)
            .await
            .unwrap();

        assert_eq!(rotated.id, first.id);
        assert_ne!(rotated.refresh_token, first.refresh_token);
        assert_ne!(rotated.access_token, first.access_token);

        let err = h
            .svc
            .sessions
            .refresh(&h.ctx, &first.refresh_token)
            .await
            .unwrap_err();
        assert!(err.is(codes::INVALID_REFRESH_TOKEN));

        let err = h.svc.sessions.authenticate(&h.ctx, &old_access).await.unwrap_err();
        assert!(err.is(codes::INVALID_ACCESS_TOKEN));

        let new_access = rotated.access_token.unwrap();
        assert!(h.svc.sessions.authenticate(&h.ctx, &new_access).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_rejected() {
        let h = setup();
        let err = h.svc.sessions.refresh(&h.ctx, "no-such-token").await.unwrap_err();
        assert!(err.is(codes::INVALID_REFRESH_TOKEN));
        assert_eq!(err.kind(), ErrorKind::TokenInvalid);
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let h = setup_with(
            SequentialTokenIssuer::new(Duration::seconds(-1), Duration::seconds(-1)),
            RoleNameScope::Global,
        );
        h.superadmin("alice").await;
        let session = h.login("alice", PASSWORD).await.unwrap().session;

        let err = h
            .svc
            .sessions
            .authenticate(&h.ctx, session.access_token.as_deref().unwrap())
            .await
            .unwrap_err();
        assert!(err.is(codes::ACCESS_TOKEN_EXPIRED));
        assert_eq!(err.kind(), ErrorKind::TokenExpired);

        let err = h
            .svc
            .sessions
            .refresh(&h.ctx, &session.refresh_token)
            .await
            .unwrap_err();
        assert!(err.is(codes::REFRESH_TOKEN_EXPIRED));
    }

    #[tokio::test]
    async fn refresh_fails_once_the_admin_is_inactive() {
        let h = setup();
        h.superadmin("root").await;
        let bob = h.admin("bob").await;
        let session = h.login("bob", PASSWORD).await.unwrap().session;

        // Deactivate without going through disable_admin so the session survives.
        let mut uow = h.store.new_uow(&h.ctx).await.unwrap();
        let mut row = uow
            .admins()
            .first_or_nil(&AdminFilter::by_id(bob.id))
            .await
            .unwrap()
            .unwrap();
        row.is_active = false;
        uow.admins().update(row).await.unwrap();
        uow.apply_changes().await.unwrap();

        let err = h
            .svc
            .sessions
            .refresh(&h.ctx, &session.refresh_token)
            .await
            .unwrap_err();
        assert!(err.is(codes::ACTOR_DISABLED));
    }

    #[tokio::test]
    async fn logout_deletes_the_session_once() {
        let h = setup();
        h.superadmin("alice").await;
        let session = h.login("alice", PASSWORD).await.unwrap().session;
        let id = session.id.unwrap();

        h.svc.sessions.logout(&h.ctx, id).await.unwrap();
        assert_eq!(h.session_count().await, 0);

        let err = h.svc.sessions.logout(&h.ctx, id).await.unwrap_err();
        assert!(err.is(codes::SESSION_NOT_FOUND));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn only_owner_or_superadmin_may_delete_a_session() {
        let h = setup();
        let root = h.superadmin("root").await;
        let bob = h.admin("bob").await;
        let carol = h.admin("carol").await;
        let session = h.login("bob", PASSWORD).await.unwrap().session;
        let id = session.id.unwrap();

        let err = h
            .svc
            .sessions
            .delete_session(&h.ctx, id, &carol.actor(), false)
            .await
            .unwrap_err();
        assert!(err.is(codes::PERMISSION_DENIED));
        assert_eq!(h.session_count().await, 1);

        h.svc
            .sessions
            .delete_session(&h.ctx, id, &root.actor(), true)
            .await
            .unwrap();
        assert_eq!(h.session_count().await, 0);

        let err = h
            .svc
            .sessions
            .delete_session(&h.ctx, id, &bob.actor(), false)
            .await
            .unwrap_err();
        assert!(err.is(codes::SESSION_NOT_FOUND));
    }

    #[tokio::test]
    async fn delete_all_sessions_for_actor_counts_deletions() {
        let h = setup();
        let alice = h.superadmin("alice").await;
        h.admin("bob").await;
        h.login("alice", PASSWORD).await.unwrap();
        h.login("alice", PASSWORD).await.unwrap();
        h.login("bob", PASSWORD).await.unwrap();

        let deleted = h
            .svc
            .sessions
            .delete_all_sessions_for_actor(&h.ctx, "admin", &id_str(&alice))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(h.session_count().await, 1);

        let err = h
            .svc
            .sessions
            .delete_all_sessions_for_actor(&h.ctx, "robot", "x")
            .await
            .unwrap_err();
        assert!(err.is(codes::INVALID_ACTOR_TYPE));
    }

    // ─────────────────────────────────────────────────────────────────────
    // RBAC
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn set_role_permissions_replaces_the_set() {
        let h = setup();
        let role = h.role("editors", "admin").await.unwrap();
        let role_id = role.id.unwrap();

        for _ in 0..2 {
            h.svc
                .rbac
                .set_role_permissions(&h.ctx, role_id, strings(&["posts.read", "posts.write"]))
                .await
                .unwrap();
            assert_eq!(h.role_permission_count(role_id).await, 2);
        }

        let out = h
            .svc
            .rbac
            .set_role_permissions(&h.ctx, role_id, strings(&["posts.read", "posts.read"]))
            .await
            .unwrap();
        assert_eq!(out.permissions, vec![Permission::from("posts.read".to_string())]);
        assert_eq!(h.role_permission_count(role_id).await, 1);

        h.svc
            .rbac
            .set_role_permissions(&h.ctx, role_id, Vec::new())
            .await
            .unwrap();
        assert_eq!(h.role_permission_count(role_id).await, 0);

        let err = h
            .svc
            .rbac
            .set_role_permissions(&h.ctx, RoleId::new(999), strings(&["x.y"]))
            .await
            .unwrap_err();
        assert!(err.is(codes::ROLE_NOT_FOUND));
    }

    #[tokio::test]
    async fn set_actor_roles_is_idempotent_and_all_or_nothing() {
        let h = setup();
        let bob = h.admin("bob").await;
        let role = h.role("editors", "admin").await.unwrap();
        let role_id = role.id.unwrap();
        let input = SetActorRolesInput {
            actor_type: "admin".to_string(),
            actor_id: id_str(&bob),
            role_ids: vec![role_id, role_id],
        };

        for _ in 0..2 {
            let out = h.svc.rbac.set_actor_roles(&h.ctx, input.clone()).await.unwrap();
            assert_eq!(out.roles.len(), 1);
            assert_eq!(h.actor_role_count(&bob.actor()).await, 1);
        }

        let err = h
            .svc
            .rbac
            .set_actor_roles(
                &h.ctx,
                SetActorRolesInput {
                    role_ids: vec![role_id, RoleId::new(404)],
                    ..input.clone()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(codes::ROLE_NOT_FOUND));
        assert_eq!(h.actor_role_count(&bob.actor()).await, 1);
    }

    #[tokio::test]
    async fn effective_permissions_are_the_union_of_roles_and_direct_grants() {
        let h = setup();
        let bob = h.admin("bob").await;
        let role = h.role("editors", "admin").await.unwrap();
        let role_id = role.id.unwrap();

        h.svc
            .rbac
            .set_role_permissions(&h.ctx, role_id, strings(&["a", "b"]))
            .await
            .unwrap();
        h.svc
            .rbac
            .set_actor_roles(
                &h.ctx,
                SetActorRolesInput {
                    actor_type: "admin".to_string(),
                    actor_id: id_str(&bob),
                    role_ids: vec![role_id],
                },
            )
            .await
            .unwrap();
        h.svc
            .rbac
            .set_actor_permissions(
                &h.ctx,
                SetActorPermissionsInput {
                    actor_type: "admin".to_string(),
                    actor_id: id_str(&bob),
                    permissions: strings(&["b", "c"]),
                },
            )
            .await
            .unwrap();

        let resolved = h
            .svc
            .rbac
            .get_effective_permissions(&h.ctx, "admin", &id_str(&bob))
            .await
            .unwrap();
        assert_eq!(resolved.from_roles, perms(&["a", "b"]));
        assert_eq!(resolved.direct, perms(&["b", "c"]));
        assert_eq!(resolved.effective, perms(&["a", "b", "c"]));

        h.svc
            .rbac
            .check_permission(&h.ctx, "admin", &id_str(&bob), &Permission::from("a".to_string()))
            .await
            .unwrap();
        let err = h
            .svc
            .rbac
            .check_permission(&h.ctx, "admin", &id_str(&bob), &Permission::from("d".to_string()))
            .await
            .unwrap_err();
        assert!(err.is(codes::PERMISSION_DENIED));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn superadmin_grant_allows_everything_and_cannot_be_reassigned() {
        let h = setup();
        let root = h.superadmin("root").await;

        h.svc
            .rbac
            .check_permission(&h.ctx, "admin", &id_str(&root), &Permission::from("any.thing".to_string()))
            .await
            .unwrap();

        let err = h
            .svc
            .rbac
            .set_actor_permissions(
                &h.ctx,
                SetActorPermissionsInput {
                    actor_type: "admin".to_string(),
                    actor_id: id_str(&root),
                    permissions: vec![Permission::SUPERADMIN.as_str().to_string()],
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(codes::PERMISSION_DENIED));

        // Replacing direct grants leaves the existing superadmin grant alone.
        h.svc
            .rbac
            .set_actor_permissions(
                &h.ctx,
                SetActorPermissionsInput {
                    actor_type: "admin".to_string(),
                    actor_id: id_str(&root),
                    permissions: strings(&["reports.read"]),
                },
            )
            .await
            .unwrap();
        assert_eq!(h.actor_permission_count(&root.actor()).await, 2);

        let resolved = h
            .svc
            .rbac
            .get_effective_permissions(&h.ctx, "admin", &id_str(&root))
            .await
            .unwrap();
        assert!(resolved.is_superadmin());
    }

    #[tokio::test]
    async fn set_actor_permissions_is_idempotent() {
        let h = setup();
        let bob = h.admin("bob").await;
        let input = SetActorPermissionsInput {
            actor_type: "admin".to_string(),
            actor_id: id_str(&bob),
            permissions: strings(&["reports.read", "reports.export", "reports.read"]),
        };

        for _ in 0..2 {
            h.svc
                .rbac
                .set_actor_permissions(&h.ctx, input.clone())
                .await
                .unwrap();
            assert_eq!(h.actor_permission_count(&bob.actor()).await, 2);

            let resolved = h
                .svc
                .rbac
                .get_effective_permissions(&h.ctx, "admin", &id_str(&bob))
                .await
                .unwrap();
            assert_eq!(resolved.effective, perms(&["reports.export", "reports.read"]));
            assert_eq!(resolved.direct, resolved.effective);
        }
    }

    #[tokio::test]
    async fn concurrent_creates_of_one_global_name_admit_one() {
        let h = setup();

        let (a, b) = tokio::join!(h.role("ops", "admin"), h.role("ops", "user"));

        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        let failed = a.err().or(b.err()).unwrap();
        assert!(failed.is(codes::ROLE_NAME_EXISTS));
    }

    #[tokio::test]
    async fn role_names_are_global_by_default() {
        let h = setup();
        h.role("ops", "admin").await.unwrap();

        let err = h.role("ops", "user").await.unwrap_err();
        assert!(err.is(codes::ROLE_NAME_EXISTS));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = h.role("ops", "robot").await.unwrap_err();
        assert!(err.is(codes::INVALID_ACTOR_TYPE));
    }

    #[tokio::test]
    async fn role_names_can_be_scoped_per_actor_type() {
        let h = setup_with(SequentialTokenIssuer::default(), RoleNameScope::ActorType);
        h.role("ops", "admin").await.unwrap();
        h.role("ops", "user").await.unwrap();

        let err = h.role("ops", "admin").await.unwrap_err();
        assert!(err.is(codes::ROLE_NAME_EXISTS));
    }

    #[tokio::test]
    async fn rename_checks_uniqueness_against_other_roles() {
        let h = setup();
        let ops = h.role("ops", "admin").await.unwrap();
        h.role("dev", "admin").await.unwrap();

        let same = h
            .svc
            .rbac
            .update_role(&h.ctx, UpdateRoleInput { id: ops.id.unwrap(), name: "ops".to_string() })
            .await
            .unwrap();
        assert_eq!(same.name, "ops");

        let err = h
            .svc
            .rbac
            .update_role(&h.ctx, UpdateRoleInput { id: ops.id.unwrap(), name: "dev".to_string() })
            .await
            .unwrap_err();
        assert!(err.is(codes::ROLE_NAME_EXISTS));
    }

    #[tokio::test]
    async fn deleting_a_role_cascades_to_grants_and_assignments() {
        let h = setup();
        let bob = h.admin("bob").await;
        let role = h.role("editors", "admin").await.unwrap();
        let role_id = role.id.unwrap();
        h.svc
            .rbac
            .set_role_permissions(&h.ctx, role_id, strings(&["posts.read"]))
            .await
            .unwrap();
        h.svc
            .rbac
            .set_actor_roles(
                &h.ctx,
                SetActorRolesInput {
                    actor_type: "admin".to_string(),
                    actor_id: id_str(&bob),
                    role_ids: vec![role_id],
                },
            )
            .await
            .unwrap();

        h.svc.rbac.delete_role(&h.ctx, role_id).await.unwrap();

        assert_eq!(h.role_permission_count(role_id).await, 0);
        assert_eq!(h.actor_role_count(&bob.actor()).await, 0);
        let resolved = h
            .svc
            .rbac
            .get_effective_permissions(&h.ctx, "admin", &id_str(&bob))
            .await
            .unwrap();
        assert!(resolved.effective.is_empty());

        let err = h.svc.rbac.delete_role(&h.ctx, role_id).await.unwrap_err();
        assert!(err.is(codes::ROLE_NOT_FOUND));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Admin lifecycle
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn sole_superadmin_cannot_be_disabled() {
        let h = setup();
        let root = h.superadmin("root").await;

        let err = h.svc.admins.disable_admin(&h.ctx, root.id).await.unwrap_err();
        assert!(err.is(codes::CANNOT_DISABLE_LAST_SUPERADMIN));
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);

        let still = h.svc.admins.get_admin(&h.ctx, root.id).await.unwrap();
        assert!(still.is_active);
    }

    #[tokio::test]
    async fn disabling_one_of_two_superadmins_terminates_only_its_sessions() {
        let h = setup();
        h.superadmin("root").await;
        let second = h.superadmin("second").await;
        let root_session = h.login("root", PASSWORD).await.unwrap().session;
        h.login("second", PASSWORD).await.unwrap();

        let out = h.svc.admins.disable_admin(&h.ctx, second.id).await.unwrap();
        assert!(!out.admin.is_active);
        assert_eq!(out.terminated_sessions, 1);

        let access = root_session.access_token.unwrap();
        assert!(h.svc.sessions.authenticate(&h.ctx, &access).await.is_ok());
        assert_eq!(h.session_count().await, 1);

        let err = h.svc.admins.disable_admin(&h.ctx, second.id).await.unwrap_err();
        assert!(err.is(codes::ADMIN_ALREADY_DISABLED));
    }

    #[tokio::test]
    async fn concurrent_disables_leave_one_superadmin() {
        let h = setup();
        let a = h.superadmin("root").await;
        let b = h.superadmin("second").await;

        let admins = h.svc.admins.clone();
        let ctx = h.ctx.clone();
        let (ra, rb) = tokio::join!(
            admins.disable_admin(&ctx, a.id),
            admins.disable_admin(&ctx, b.id)
        );

        assert_eq!(usize::from(ra.is_ok()) + usize::from(rb.is_ok()), 1);
        let failed = ra.err().or(rb.err()).unwrap();
        assert!(failed.is(codes::CANNOT_DISABLE_LAST_SUPERADMIN));
    }

    #[tokio::test]
    async fn demoting_the_last_superadmin_is_refused() {
        let h = setup();
        let root = h.superadmin("root").await;
        let demote = |id| UpdateAdminInput {
            id,
            is_superadmin: Some(false),
            ..Default::default()
        };

        let err = h
            .svc
            .admins
            .update_admin(&h.ctx, demote(root.id))
            .await
            .unwrap_err();
        assert!(err.is(codes::CANNOT_DEMOTE_LAST_SUPERADMIN));

        let second = h.superadmin("second").await;
        let demoted = h
            .svc
            .admins
            .update_admin(&h.ctx, demote(second.id))
            .await
            .unwrap();
        assert!(!demoted.is_superadmin);

        let resolved = h
            .svc
            .rbac
            .get_effective_permissions(&h.ctx, "admin", &id_str(&second))
            .await
            .unwrap();
        assert!(!resolved.is_superadmin());
    }

    #[tokio::test]
    async fn promotion_sets_the_flag_without_granting_the_permission() {
        let h = setup();
        let root = h.superadmin("root").await;
        let bob = h.admin("bob").await;

        let promoted = h
            .svc
            .admins
            .update_admin(
                &h.ctx,
                UpdateAdminInput {
                    id: bob.id,
                    is_superadmin: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(promoted.is_superadmin);
        assert_eq!(h.actor_permission_count(&bob.actor()).await, 0);

        let resolved = h
            .svc
            .rbac
            .get_effective_permissions(&h.ctx, "admin", &id_str(&bob))
            .await
            .unwrap();
        assert!(!resolved.is_superadmin());

        // The flag alone counts toward the active superadmins.
        h.svc.admins.disable_admin(&h.ctx, root.id).await.unwrap();
    }

    #[tokio::test]
    async fn create_admin_never_writes_the_reserved_permission() {
        let h = setup();
        let carol = h
            .svc
            .admins
            .create_admin(
                &h.ctx,
                CreateAdminInput {
                    username: "carol".to_string(),
                    password: PASSWORD.to_string(),
                    is_superadmin: true,
                },
            )
            .await
            .unwrap();

        assert!(carol.is_superadmin);
        assert_eq!(h.actor_permission_count(&carol.actor()).await, 0);
    }

    #[tokio::test]
    async fn update_admin_rejects_username_clash() {
        let h = setup();
        h.admin("bob").await;
        let carol = h.admin("carol").await;

        let err = h
            .svc
            .admins
            .update_admin(
                &h.ctx,
                UpdateAdminInput {
                    id: carol.id,
                    username: Some("bob".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(codes::USERNAME_EXISTS));

        let renamed = h
            .svc
            .admins
            .update_admin(
                &h.ctx,
                UpdateAdminInput {
                    id: carol.id,
                    username: Some("caroline".to_string()),
                    password: Some("newpass1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.username, "caroline");
        assert!(h.login("caroline", "newpass1").await.is_ok());
    }

    #[tokio::test]
    async fn create_admin_validates_and_rejects_duplicates() {
        let h = setup();
        h.admin("bob").await;

        let err = h
            .svc
            .admins
            .create_admin(
                &h.ctx,
                CreateAdminInput {
                    username: "bob".to_string(),
                    password: PASSWORD.to_string(),
                    is_superadmin: false,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(codes::USERNAME_EXISTS));

        let err = h
            .svc
            .admins
            .create_admin(
                &h.ctx,
                CreateAdminInput {
                    username: "x".to_string(),
                    password: PASSWORD.to_string(),
                    is_superadmin: false,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(codes::VALIDATION_FAILED));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(h.admin_count().await, 1);
    }

    #[tokio::test]
    async fn list_admins_pages_and_counts() {
        let h = setup();
        for name in ["ann", "ben", "cat"] {
            h.admin(name).await;
        }

        let first = h
            .svc
            .admins
            .list_admins(
                &h.ctx,
                ListAdminsInput {
                    page: Some(1),
                    page_size: Some(2),
                    is_active: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, 3);

        let second = h
            .svc
            .admins
            .list_admins(
                &h.ctx,
                ListAdminsInput {
                    page: Some(2),
                    page_size: Some(2),
                    is_active: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.page, 2);
    }

    #[tokio::test]
    async fn listing_past_the_offset_range_is_rejected() {
        let h = setup();
        h.admin("ann").await;

        let err = h
            .svc
            .admins
            .list_admins(
                &h.ctx,
                ListAdminsInput {
                    page: Some(u64::MAX),
                    page_size: Some(100),
                    is_active: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(codes::VALIDATION_FAILED));

        let err = h
            .svc
            .rbac
            .list_roles(
                &h.ctx,
                ListRolesInput {
                    page: Some(u64::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(codes::VALIDATION_FAILED));

        // A far but representable page is just empty.
        let far = h
            .svc
            .admins
            .list_admins(
                &h.ctx,
                ListAdminsInput {
                    page: Some(1_000_000),
                    page_size: Some(100),
                    is_active: None,
                },
            )
            .await
            .unwrap();
        assert!(far.items.is_empty());
        assert_eq!(far.total, 1);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bootstrap and atomicity
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn bootstrap_rolls_back_when_the_grant_fails() {
        let h = setup();
        h.store.fail_next("actor_permissions", StoreOp::Create);

        let err = h
            .svc
            .bootstrap
            .create_superadmin(
                &h.ctx,
                CreateSuperadminInput {
                    username: "root".to_string(),
                    password: PASSWORD.to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(h.admin_count().await, 0);

        let root = h.superadmin("root").await;
        assert!(root.is_superadmin);
        assert_eq!(h.actor_permission_count(&root.actor()).await, 1);
    }

    #[tokio::test]
    async fn bootstrap_rejects_an_existing_username() {
        let h = setup();
        h.superadmin("root").await;

        let err = h
            .svc
            .bootstrap
            .create_superadmin(
                &h.ctx,
                CreateSuperadminInput {
                    username: "root".to_string(),
                    password: PASSWORD.to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is(codes::USERNAME_EXISTS));
        assert_eq!(h.admin_count().await, 1);
    }

    #[tokio::test]
    async fn failed_commit_persists_nothing() {
        let h = setup();
        h.store.fail_next_commit();

        let err = h
            .svc
            .admins
            .create_admin(
                &h.ctx,
                CreateAdminInput {
                    username: "bob".to_string(),
                    password: PASSWORD.to_string(),
                    is_superadmin: false,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(h.admin_count().await, 0);
    }

    #[tokio::test]
    async fn cancelled_or_expired_requests_touch_nothing() {
        let h = setup();
        h.superadmin("alice").await;

        let cancelled = RequestContext::background();
        cancelled.cancel();
        let err = h
            .svc
            .sessions
            .login(
                &cancelled,
                LoginInput {
                    username: "alice".to_string(),
                    password: PASSWORD.to_string(),
                    ip_address: String::new(),
                    user_agent: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let expired = RequestContext::with_timeout(std::time::Duration::ZERO);
        let err = h
            .svc
            .admins
            .list_admins(&expired, ListAdminsInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        assert_eq!(h.session_count().await, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn resolution_matches_set_union(
            from_role in proptest::collection::btree_set("[a-z]{1,4}\\.[a-z]{1,4}", 0..5),
            direct in proptest::collection::btree_set("[a-z]{1,4}\\.[a-z]{1,4}", 0..5),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let resolved = rt.block_on(async {
                let h = setup();
                let role = h.role("readers", "user").await.unwrap();
                let role_id = role.id.unwrap();
                h.svc.rbac
                    .set_role_permissions(&h.ctx, role_id, from_role.iter().cloned().collect())
                    .await
                    .unwrap();
                h.svc.rbac
                    .set_actor_roles(&h.ctx, SetActorRolesInput {
                        actor_type: "user".to_string(),
                        actor_id: "u-1".to_string(),
                        role_ids: vec![role_id],
                    })
                    .await
                    .unwrap();
                h.svc.rbac
                    .set_actor_permissions(&h.ctx, SetActorPermissionsInput {
                        actor_type: "user".to_string(),
                        actor_id: "u-1".to_string(),
                        permissions: direct.iter().cloned().collect(),
                    })
                    .await
                    .unwrap();
                h.svc.rbac.get_effective_permissions(&h.ctx, "user", "u-1").await.unwrap()
            });

            let expected: BTreeSet<Permission> =
                from_role.union(&direct).cloned().map(Permission::from).collect();
            prop_assert_eq!(resolved.effective, expected);
        }
    }
}
