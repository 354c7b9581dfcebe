/// Auth collaborator. Token storage and refresh live on the host side; the
/// sync layer only asks whether a session exists and reports rejections.
pub trait SessionProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// The backend answered 401. Hosts typically clear the session here.
    fn on_unauthorized(&self) {}
}

/// For public resources that load with or without a signed-in user.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicAccess;

impl SessionProvider for PublicAccess {
    fn is_authenticated(&self) -> bool {
        true
    }
}
