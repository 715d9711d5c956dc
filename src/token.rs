use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

/// A bearer token provider. Accepts three shapes, collapsed by
/// `SingleExchange` to a resolved string before header assembly (spec.md
/// section 9, "Token provider polymorphism").
#[derive(Clone)]
pub enum Token {
    Literal(String),
    Deferred(Arc<dyn Fn() -> BoxFuture<String> + Send + Sync>),
}

impl Token {
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal(value.into())
    }

    /// Wrap a nullary callable producing a future that resolves to a token
    /// string (covers both the "deferred value" and "callable" shapes from
    /// spec.md section 3 — a plain callable is just a `Deferred` whose
    /// future resolves immediately).
    pub fn callable<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, Error>> + Send + 'static,
    {
        Token::Deferred(Arc::new(move || Box::pin(f())))
    }

    pub async fn resolve(&self) -> Result<String, Error> {
        match self {
            Token::Literal(s) => Ok(s.clone()),
            Token::Deferred(f) => f().await,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Literal(_) => write!(f, "Token::Literal(..)"),
            Token::Deferred(_) => write!(f, "Token::Deferred(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_resolves_to_itself() {
        let t = Token::literal("abc123");
        assert_eq!(t.resolve().await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn callable_resolves_via_future() {
        let t = Token::callable(|| async { Ok("fetched".to_string()) });
        assert_eq!(t.resolve().await.unwrap(), "fetched");
    }

    #[tokio::test]
    async fn callable_can_fail() {
        let t = Token::callable(|| async {
            Err(Error::ConfigurationError("no token available".into()))
        });
        assert!(t.resolve().await.is_err());
    }
}
