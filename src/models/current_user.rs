use uuid::Uuid;

/// The authenticated caller, placed in request extensions by the auth middleware.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub admin_role: i64,
}
