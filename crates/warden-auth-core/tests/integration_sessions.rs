//! Integration tests for the session lifecycle: login, rotation, reuse
//! detection and revocation

mod common;

use common::Harness;
use warden_auth_core::{notify::events, AuthError, DeviceContext, LoginRequest, VerifiedCredential};
use warden_types::{FederatedIdentity, Role, SessionId};

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_creates_one_record_per_device() {
    let h = Harness::new();
    let p = h.principal("user");

    h.login(&p, "device-a", false).await;
    h.login(&p, "device-a", false).await;
    h.login(&p, "device-b", false).await;

    assert_eq!(h.sessions.count_for(p.id), 2);
}

#[tokio::test]
async fn test_login_never_stores_raw_secrets() {
    let h = Harness::new();
    let p = h.principal("user");
    let outcome = h.login(&p, "device-a", false).await;

    let rows = h.sessions.all_for(p.id);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_ne!(row.device_id_hash, "device-a");
    assert!(!row.refresh_credential_hash.contains(&outcome.tokens.refresh_token));
    assert!(row.refresh_credential_hash.contains('$'));
    assert_eq!(row.id, outcome.session.id.0);
}

#[tokio::test]
async fn test_login_generates_device_id_when_absent() {
    let h = Harness::new();
    let p = h.principal("user");
    let outcome = h
        .service
        .login(LoginRequest {
            credential: VerifiedCredential::Password {
                principal_id: p.user_id(),
            },
            device: DeviceContext::default(),
            remember: false,
        })
        .await
        .unwrap();

    assert!(!outcome.device_id.is_empty());
    h.service
        .rotate(&outcome.tokens.refresh_token, &outcome.device_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_login_unknown_principal_is_invalid_credentials() {
    let h = Harness::new();
    let err = h
        .service
        .login(LoginRequest {
            credential: VerifiedCredential::Password {
                principal_id: warden_types::UserId::new(),
            },
            device: DeviceContext::default(),
            remember: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_login_notifies_other_connections() {
    let h = Harness::new();
    let p = h.principal("user");
    h.login(&p, "device-a", false).await;
    assert!(h.notifier.names().contains(&events::NEW_SESSION.to_string()));
}

#[tokio::test]
async fn test_refresh_class_follows_remember_flag() {
    let h = Harness::new();
    let p = h.principal("user");

    let short = h.login(&p, "device-a", false).await;
    let long = h.login(&p, "device-b", true).await;

    assert_eq!(short.tokens.refresh_expires_in, 24 * 60 * 60);
    assert_eq!(long.tokens.refresh_expires_in, 30 * 24 * 60 * 60);

    let issuer = h.service.sessions().issuer();
    let claims = issuer.verify_refresh(&short.tokens.refresh_token).unwrap();
    assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
}

// ============================================================================
// Federated login
// ============================================================================

#[tokio::test]
async fn test_federated_login_creates_then_reuses_principal() {
    let h = Harness::new();
    let identity = FederatedIdentity {
        email: "Fed@Example.com".to_string(),
        subject: "google|123".to_string(),
        display_name: Some("Fed".to_string()),
    };
    let login = |identity: FederatedIdentity, device: &str| LoginRequest {
        credential: VerifiedCredential::Federated(identity),
        device: DeviceContext {
            device_id: Some(device.to_string()),
            ..Default::default()
        },
        remember: true,
    };

    let first = h.service.login(login(identity.clone(), "d1")).await.unwrap();
    let second = h.service.login(login(identity, "d2")).await.unwrap();

    assert_eq!(first.user_id, second.user_id);
    assert_eq!(first.role, Role::User);
    assert_eq!(h.principals.count(), 1);
    assert_eq!(
        h.principals.get(first.user_id.0).unwrap().email,
        "fed@example.com"
    );
}

#[tokio::test]
async fn test_federated_login_links_existing_email() {
    let h = Harness::new();
    let p = h.principal("agent");

    let outcome = h
        .service
        .login(LoginRequest {
            credential: VerifiedCredential::Federated(FederatedIdentity {
                email: p.email.to_uppercase(),
                subject: "github|77".to_string(),
                display_name: None,
            }),
            device: DeviceContext::default(),
            remember: false,
        })
        .await
        .unwrap();

    assert_eq!(outcome.user_id, p.user_id());
    assert_eq!(outcome.role, Role::Agent);
    assert_eq!(
        h.principals.get(p.id).unwrap().federated_subject.as_deref(),
        Some("github|77")
    );
}

// ============================================================================
// Rotation and reuse detection
// ============================================================================

#[tokio::test]
async fn test_rotation_invalidates_previous_refresh_token() {
    let h = Harness::new();
    let p = h.principal("user");
    let outcome = h.login(&p, "device-a", false).await;
    let old = outcome.tokens.refresh_token;

    let fresh = h.service.rotate(&old, "device-a").await.unwrap();
    assert_ne!(fresh.refresh_token, old);

    let err = h.service.rotate(&old, "device-a").await.unwrap_err();
    assert!(matches!(err, AuthError::ReusedCredentialDetected));
    assert!(err.clears_client_session());
    assert_eq!(h.sessions.count_for(p.id), 0);
}

#[tokio::test]
async fn test_concurrent_rotation_has_one_winner() {
    let h = Harness::new();
    let p = h.principal("user");
    let token = h.login(&p, "device-a", false).await.tokens.refresh_token;

    let (a, b) = tokio::join!(
        h.service.rotate(&token, "device-a"),
        h.service.rotate(&token, "device-a")
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);
    let loser = a.err().or(b.err()).unwrap();
    assert!(matches!(loser, AuthError::ReusedCredentialDetected));
}

#[tokio::test]
async fn test_reuse_revokes_every_device_and_siblings_see_session_not_found() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    let b = h.login(&p, "device-b", false).await;
    let c = h.login(&p, "device-c", true).await;

    h.service.rotate(&a.tokens.refresh_token, "device-a").await.unwrap();
    let err = h
        .service
        .rotate(&a.tokens.refresh_token, "device-a")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReusedCredentialDetected));
    assert_eq!(h.sessions.count_for(p.id), 0);
    assert!(h.notifier.names().contains(&events::FORCED_LOGOUT.to_string()));

    for (token, device) in [
        (&b.tokens.refresh_token, "device-b"),
        (&c.tokens.refresh_token, "device-c"),
    ] {
        let err = h.service.rotate(token, device).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound), "got {err:?}");
    }
}

#[tokio::test]
async fn test_relogin_after_containment_is_usable() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    h.service.rotate(&a.tokens.refresh_token, "device-a").await.unwrap();
    let _ = h.service.rotate(&a.tokens.refresh_token, "device-a").await;

    let again = h.login(&p, "device-a", false).await;
    let rotated = h
        .service
        .rotate(&again.tokens.refresh_token, "device-a")
        .await
        .unwrap();
    h.service
        .rotate(&rotated.refresh_token, "device-a")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_token_issued_right_after_containment_stays_protected() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    h.service.rotate(&a.tokens.refresh_token, "device-a").await.unwrap();
    let _ = h.service.rotate(&a.tokens.refresh_token, "device-a").await;

    // Same second as the containment; the watermark must not cover it.
    let again = h.login(&p, "device-a", false).await;
    h.login(&p, "device-b", false).await;
    h.service.logout(p.user_id(), "device-a").await.unwrap();

    let err = h
        .service
        .rotate(&again.tokens.refresh_token, "device-a")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReusedCredentialDetected));
    assert_eq!(h.sessions.count_for(p.id), 0);
}

#[tokio::test]
async fn test_refresh_token_from_another_device_is_reuse() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    h.login(&p, "device-b", false).await;

    let err = h
        .service
        .rotate(&a.tokens.refresh_token, "device-b")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReusedCredentialDetected));
    assert_eq!(h.sessions.count_for(p.id), 0);
}

#[tokio::test]
async fn test_invalid_refresh_token_mutates_nothing() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;

    let err = h.service.rotate("garbage.token.value", "device-a").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidSignature));

    // Access token is not a refresh token
    let err = h
        .service
        .rotate(&a.tokens.access_token, "device-a")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSignature));
    assert_eq!(h.sessions.count_for(p.id), 1);
}

#[tokio::test]
async fn test_rotation_requires_device_id() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    let err = h.service.rotate(&a.tokens.refresh_token, "  ").await.unwrap_err();
    assert!(matches!(err, AuthError::DeviceIdMissing));
}

#[tokio::test]
async fn test_short_class_is_sticky_across_rotations() {
    let h = Harness::new();
    let p = h.principal("user");
    let mut token = h.login(&p, "device-a", false).await.tokens.refresh_token;

    for _ in 0..3 {
        let pair = h.service.rotate(&token, "device-a").await.unwrap();
        assert_eq!(pair.refresh_expires_in, 24 * 60 * 60);
        token = pair.refresh_token;
    }
    let row = &h.sessions.all_for(p.id)[0];
    assert!(!row.remember);
}

#[tokio::test]
async fn test_rotation_picks_up_current_role() {
    let h = Harness::new();
    let mut p = h.principal("user");
    let token = h.login(&p, "device-a", false).await.tokens.refresh_token;

    p.role = "admin".to_string();
    h.principals.insert(p.clone());

    let pair = h.service.rotate(&token, "device-a").await.unwrap();
    let who = h
        .service
        .authenticate(Some(&pair.access_token), Some("device-a"), Role::Admin)
        .await
        .unwrap();
    assert_eq!(who.role, Role::Admin);
}

// ============================================================================
// Logout and revocation
// ============================================================================

#[tokio::test]
async fn test_logout_removes_only_own_device() {
    let h = Harness::new();
    let p = h.principal("user");
    h.login(&p, "device-a", false).await;
    h.login(&p, "device-b", false).await;

    h.service.logout(p.user_id(), "device-a").await.unwrap();
    let remaining = h.sessions.all_for(p.id);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].device_label.as_deref(), Some("device device-b"));
}

#[tokio::test]
async fn test_logout_all_then_siblings_get_session_not_found() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    h.login(&p, "device-b", false).await;

    assert_eq!(h.service.logout_all(p.user_id()).await.unwrap(), 2);
    let err = h
        .service
        .rotate(&a.tokens.refresh_token, "device-a")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
}

#[tokio::test]
async fn test_revoke_session_by_id() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    let b = h.login(&p, "device-b", false).await;

    let err = h
        .service
        .revoke_session(p.user_id(), "device-a", a.session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::CannotRevokeCurrentSession));

    h.service
        .revoke_session(p.user_id(), "device-a", b.session.id)
        .await
        .unwrap();
    assert_eq!(h.sessions.count_for(p.id), 1);

    let err = h
        .service
        .revoke_session(p.user_id(), "device-a", b.session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));

    // The revoked device is told to log in again; the revoker keeps going.
    let err = h
        .service
        .rotate(&b.tokens.refresh_token, "device-b")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
    h.service
        .rotate(&a.tokens.refresh_token, "device-a")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_revoke_by_id_keeps_replay_containment_for_other_devices() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    let b = h.login(&p, "device-b", false).await;
    let c = h.login(&p, "device-c", false).await;

    h.service
        .revoke_session(p.user_id(), "device-a", b.session.id)
        .await
        .unwrap();
    h.service.logout(p.user_id(), "device-c").await.unwrap();

    // c's record is gone but c was never revoked by id: replay.
    let err = h
        .service
        .rotate(&c.tokens.refresh_token, "device-c")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReusedCredentialDetected));
    assert_eq!(h.sessions.count_for(p.id), 0);

    let err = h
        .service
        .rotate(&a.tokens.refresh_token, "device-a")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
}

#[tokio::test]
async fn test_revoked_device_marker_does_not_cover_its_next_login() {
    let h = Harness::new();
    let p = h.principal("user");
    h.login(&p, "device-a", false).await;
    let b = h.login(&p, "device-b", false).await;

    h.service
        .revoke_session(p.user_id(), "device-a", b.session.id)
        .await
        .unwrap();
    let again = h.login(&p, "device-b", false).await;
    h.service.logout(p.user_id(), "device-b").await.unwrap();

    let err = h
        .service
        .rotate(&again.tokens.refresh_token, "device-b")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReusedCredentialDetected));
    assert_eq!(h.sessions.count_for(p.id), 0);
}

#[tokio::test]
async fn test_revoke_session_of_another_principal_is_not_found() {
    let h = Harness::new();
    let p = h.principal("user");
    let q = h.principal("user");
    h.login(&p, "device-a", false).await;
    let theirs = h.login(&q, "device-q", false).await;

    let err = h
        .service
        .revoke_session(p.user_id(), "device-a", theirs.session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
    assert_eq!(h.sessions.count_for(q.id), 1);

    let err = h
        .service
        .revoke_session(p.user_id(), "device-a", SessionId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
}

#[tokio::test]
async fn test_list_sessions_flags_current_device() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    h.login(&p, "device-b", true).await;

    let views = h
        .service
        .list_sessions(p.user_id(), Some("device-a"))
        .await
        .unwrap();
    assert_eq!(views.len(), 2);
    let current: Vec<_> = views.iter().filter(|v| v.is_current).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, a.session.id);

    let json = serde_json::to_string(&views).unwrap();
    assert!(!json.contains('$'));
}

#[tokio::test]
async fn test_expired_records_are_hidden_and_purged() {
    let h = Harness::new();
    let p = h.principal("user");
    h.login(&p, "device-a", false).await;
    let b = h.login(&p, "device-b", false).await;

    let b_hash = h.service.sessions().hash_device_id("device-b");
    h.sessions.expire(p.id, &b_hash);

    let views = h.service.list_sessions(p.user_id(), None).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_ne!(views[0].id, b.session.id);

    assert_eq!(h.service.purge_expired_sessions().await.unwrap(), 1);
    assert_eq!(h.sessions.count_for(p.id), 1);
}

// ============================================================================
// Password change
// ============================================================================

#[tokio::test]
async fn test_password_change_keeps_current_device_only() {
    let h = Harness::new();
    let p = h.principal("user");
    let a = h.login(&p, "device-a", false).await;
    let b = h.login(&p, "device-b", false).await;
    h.login(&p, "device-c", true).await;

    let revoked = h
        .service
        .change_password(p.user_id(), "device-a", "new-opaque-hash")
        .await
        .unwrap();
    assert_eq!(revoked, 2);
    assert_eq!(
        h.principals.get(p.id).unwrap().password_hash.as_deref(),
        Some("new-opaque-hash")
    );

    // The acting device survives one more rotation without tripping reuse
    h.service
        .rotate(&a.tokens.refresh_token, "device-a")
        .await
        .unwrap();
    assert_eq!(h.sessions.count_for(p.id), 1);

    let err = h
        .service
        .rotate(&b.tokens.refresh_token, "device-b")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
}

#[tokio::test]
async fn test_password_change_without_current_session() {
    let h = Harness::new();
    let p = h.principal("user");
    h.login(&p, "device-a", false).await;

    let err = h
        .service
        .change_password(p.user_id(), "device-unknown", "new-hash")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
    assert_eq!(
        h.principals.get(p.id).unwrap().password_hash.as_deref(),
        Some("opaque-hash")
    );
    assert_eq!(h.sessions.count_for(p.id), 1);
}

// ============================================================================
// Guarded requests
// ============================================================================

#[tokio::test]
async fn test_single_flight_around_rotation() {
    let h = Harness::new();
    let p = h.principal("user");
    let token = h.login(&p, "device-a", false).await.tokens.refresh_token;
    let guard = h.service.single_flight();

    let permit = guard.acquire(&p.id.to_string()).await.unwrap();
    let blocked = guard
        .run(&p.id.to_string(), h.service.rotate(&token, "device-a"))
        .await;
    assert!(matches!(blocked, Err(AuthError::ConcurrentRequestInFlight)));
    guard.release(permit).await.unwrap();

    let pair = guard
        .run(&p.id.to_string(), h.service.rotate(&token, "device-a"))
        .await
        .unwrap();
    assert!(!pair.access_token.is_empty());
}
