//! End-to-end auth flows against the in-memory store.

mod common;

use warden_core::auth::AuthError;
use warden_core::auth::password::{is_legacy_hash, verify_password};
use warden_core::models::auth::{AuthProvider, SocialProfile, SocialProvider, TokenType};
use warden_core::store::CredentialStore;

use common::{LEGACY_PW123, insert_email_user, services};

#[tokio::test]
async fn sign_up_sign_in_revoke_refresh_scenario() {
    let (_store, auth) = services();

    let signed_up = auth.identity.sign_up("a@x.com", "pw123", "Ann").await.unwrap();
    assert_eq!(signed_up.token_version, 0);
    let claims = auth
        .tokens
        .verify_access(&signed_up.tokens.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claims.token_version, 0);
    assert_eq!(claims.token_type, TokenType::Access);

    let signed_in = auth.identity.sign_in("a@x.com", "pw123").await.unwrap();
    assert_eq!(signed_in.token_version, 0);
    assert_eq!(signed_in.user.id, signed_up.user.id);

    let bumped = auth.identity.revoke_sessions(&signed_up.user.id).await.unwrap();
    assert_eq!(bumped, 1);
    assert!(
        auth.tokens
            .refresh(&signed_in.tokens.refresh_token)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        auth.tokens
            .verify_access(&signed_in.tokens.access_token)
            .await
            .unwrap()
            .is_none()
    );

    let again = auth.identity.sign_in("a@x.com", "pw123").await.unwrap();
    assert_eq!(again.token_version, 1);
    let claims = auth
        .tokens
        .verify_access(&again.tokens.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claims.token_version, 1);

    let rotated = auth
        .tokens
        .refresh(&again.tokens.refresh_token)
        .await
        .unwrap()
        .unwrap();
    let rotated_claims = auth
        .tokens
        .verify_refresh(&rotated.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rotated_claims.token_version, 1);
    assert_eq!(rotated_claims.project_id, again.project.id);
}

#[tokio::test]
async fn duplicate_sign_up_keeps_one_user() {
    let (store, auth) = services();
    auth.identity.sign_up("a@x.com", "pw123", "Ann").await.unwrap();

    let err = auth
        .identity
        .sign_up("a@x.com", "pw456", "Other Ann")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DuplicateEmail));
    assert_eq!(store.user_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sign_ups_for_one_email_create_one_user() {
    let (store, auth) = services();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let identity = auth.identity.clone();
            tokio::spawn(async move { identity.sign_up("race@x.com", "pw123", "Racer").await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(AuthError::DuplicateEmail) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(store.user_count().await, 1);
    assert_eq!(store.platform_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_default_project_requests_agree() {
    let (store, auth) = services();
    let platform = auth.identity.ensure_default_platform().await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let identity = auth.identity.clone();
            let platform_id = platform.id.clone();
            tokio::spawn(async move {
                identity
                    .get_or_create_default_project("user-1", &platform_id)
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(store.projects_owned_by("user-1").await.len(), 1);
    assert_eq!(store.members_of(&ids[0]).await.len(), 1);
}

#[tokio::test]
async fn legacy_password_migrates_on_first_successful_sign_in() {
    let (store, auth) = services();
    let user = insert_email_user(store.as_ref(), "old@x.com", LEGACY_PW123).await;

    auth.identity.sign_in("old@x.com", "pw123").await.unwrap();
    let identity = store
        .find_identity(&user.id, AuthProvider::Email)
        .await
        .unwrap()
        .unwrap();
    let migrated = identity.password.unwrap();
    assert!(!is_legacy_hash(&migrated));

    auth.identity.sign_in("old@x.com", "pw123").await.unwrap();
    let identity = store
        .find_identity(&user.id, AuthProvider::Email)
        .await
        .unwrap()
        .unwrap();
    let after = identity.password.unwrap();
    assert_eq!(after, migrated);
    assert!(verify_password("pw123", &after));
}

#[tokio::test]
async fn social_sign_in_links_to_email_account() {
    let (store, auth) = services();
    let signed_up = auth.identity.sign_up("a@x.com", "pw123", "Ann").await.unwrap();
    let profile = SocialProfile {
        email: "a@x.com".into(),
        name: "Ann A.".into(),
        image: Some("https://avatars.example/ann.png".into()),
        provider: SocialProvider::Github,
    };

    let first = auth.identity.sign_in_social(profile.clone()).await.unwrap();
    let second = auth.identity.sign_in_social(profile).await.unwrap();

    assert_eq!(first.user.id, signed_up.user.id);
    assert_eq!(second.user.id, signed_up.user.id);
    assert_eq!(store.user_count().await, 1);
    assert_eq!(store.identities_for(&signed_up.user.id).await.len(), 2);
    assert_eq!(
        second.user.image.as_deref(),
        Some("https://avatars.example/ann.png")
    );

    // Password sign-in still works after linking.
    auth.identity.sign_in("a@x.com", "pw123").await.unwrap();
}

#[tokio::test]
async fn sessions_resolve_through_the_facade() {
    let (_store, auth) = services();
    let outcome = auth.identity.sign_up("a@x.com", "pw123", "Ann").await.unwrap();

    let session = auth
        .sessions
        .session_for_token(&outcome.tokens.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.user_id, outcome.user.id);
    assert_eq!(session.name, "Ann");
    assert_eq!(session.project_id, outcome.project.id);

    auth.identity.revoke_sessions(&outcome.user.id).await.unwrap();
    assert!(
        auth.sessions
            .session_for_token(&outcome.tokens.access_token)
            .await
            .unwrap()
            .is_none()
    );
}
