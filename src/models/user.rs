use std::hash::{Hash, Hasher};

// Passwords are stored and compared in clear by design of the service.
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub password: String,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Identity is the username alone; the password never participates.
impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.username.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_password() {
        let a = User::new("alice", "p1");
        let b = User::new("alice", "p2");
        assert_eq!(a, b);
        assert_ne!(a, User::new("bob", "p1"));
    }
}
