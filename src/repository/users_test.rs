use super::*;

fn draft() -> UserDraft {
    UserDraft { username: "test_user_".into(), email: "User1@Meta.UA".into(), password: "qwerty".into() }
}

#[test]
fn validate_normalizes_email_and_trims_username() {
    let mut d = draft();
    d.username = "  test_user_ ".into();
    let valid = d.validate().unwrap();
    assert_eq!(valid.username, "test_user_");
    assert_eq!(valid.email, "user1@meta.ua");
    assert_eq!(valid.password, "qwerty");
}

#[test]
fn validate_rejects_short_fields() {
    let d = UserDraft { username: "abc".into(), email: "a@b.ua".into(), password: "123".into() };
    let errors = d.validate().unwrap_err();
    assert!(errors.has("username"));
    assert!(errors.has("email"));
    assert!(errors.has("password"));
}

#[test]
fn validate_rejects_malformed_email() {
    let mut d = draft();
    d.email = "not-an-email-address".into();
    let errors = d.validate().unwrap_err();
    assert_eq!(errors.0.len(), 1);
    assert!(errors.has("email"));
}

#[test]
fn validate_rejects_long_password() {
    let mut d = draft();
    d.password = "p".repeat(31);
    assert!(d.validate().unwrap_err().has("password"));
}

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;

    async fn pool() -> PgPool {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL required");
        crate::db::init_pool(&url, 2).await.expect("test db init")
    }

    fn unique_email() -> String {
        format!("u{}@example.com", crate::services::auth::bytes_to_hex(&rand::random::<[u8; 6]>()))
    }

    fn new_user(email: &str) -> NewUser {
        NewUser { username: "test_user_".into(), email: email.to_owned(), password_hash: "hash".into() }
    }

    #[tokio::test]
    async fn create_then_get_by_email() {
        let pool = pool().await;
        let email = unique_email();
        let created = create_user(&pool, &new_user(&email)).await.unwrap();
        assert_eq!(created.username, "test_user_");
        assert_eq!(created.email, email);
        assert_eq!(created.password, "hash");
        assert!(!created.confirmed);
        assert_eq!(created.avatar, Some(gravatar_url(&email)));

        let fetched = get_user_by_email(&pool, &email).await.unwrap();
        assert_eq!(fetched, Some(created));
    }

    #[tokio::test]
    async fn duplicate_email_is_already_exists() {
        let pool = pool().await;
        let email = unique_email();
        create_user(&pool, &new_user(&email)).await.unwrap();
        let err = create_user(&pool, &new_user(&email)).await.unwrap_err();
        assert!(matches!(err, RepoError::AlreadyExists));
    }

    #[tokio::test]
    async fn confirmed_email_sets_flag() {
        let pool = pool().await;
        let email = unique_email();
        create_user(&pool, &new_user(&email)).await.unwrap();
        assert!(confirmed_email(&pool, &email).await.unwrap());
        let user = get_user_by_email(&pool, &email).await.unwrap().unwrap();
        assert!(user.confirmed);
        assert!(!confirmed_email(&pool, "nobody@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn update_token_stores_and_clears() {
        let pool = pool().await;
        let user = create_user(&pool, &new_user(&unique_email())).await.unwrap();

        update_token(&pool, user.id, Some("refresh-abc")).await.unwrap();
        let stored = get_user_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-abc"));

        update_token(&pool, user.id, None).await.unwrap();
        let cleared = get_user_by_id(&pool, user.id).await.unwrap().unwrap();
        assert!(cleared.refresh_token.is_none());
    }

    #[tokio::test]
    async fn update_role_changes_role() {
        let pool = pool().await;
        let user = create_user(&pool, &new_user(&unique_email())).await.unwrap();
        let updated = update_role(&pool, user.id, Role::Moderator).await.unwrap().unwrap();
        assert_eq!(updated.role, Role::Moderator);
        assert!(update_role(&pool, i64::MAX, Role::Admin).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_signups_promote_at_most_one_admin() {
        let pool = pool().await;
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { create_user(&pool, &new_user(&unique_email())).await })
            })
            .collect();

        let mut admins = 0;
        for handle in handles {
            let user = handle.await.unwrap().unwrap();
            if user.role == Role::Admin {
                admins += 1;
            }
        }
        assert!(admins <= 1, "{admins} admins created concurrently");
    }
}
