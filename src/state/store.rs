use std::sync::Arc;

use dashmap::DashMap;

use crate::types::{Source, Token};

/// In-memory token map. The only shared mutable structure in the pipeline —
/// owned logically by the Token Manager, but exposed here as a plain
/// `DashMap` wrapper so the Read API can snapshot it without going through
/// the manager's task.
pub struct TokenStore {
    tokens: DashMap<String, Token>,
}

impl TokenStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { tokens: DashMap::new() })
    }

    pub fn upsert(&self, token: Token) {
        self.tokens.insert(token.contract_address.clone(), token);
    }

    pub fn get(&self, address: &str) -> Option<Token> {
        self.tokens.get(address).map(|e| e.value().clone())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn remove(&self, address: &str) -> Option<Token> {
        self.tokens.remove(address).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn all(&self) -> Vec<Token> {
        self.tokens.iter().map(|e| e.value().clone()).collect()
    }

    /// Atomic read-modify-write on a single token. `f` observes the prior
    /// state and mutates in place — used for peak/tier-crossing detection,
    /// which must see the previous-and-new pair together (§4.6.5).
    pub fn mutate<R>(&self, address: &str, f: impl FnOnce(&mut Token) -> R) -> Option<R> {
        self.tokens.get_mut(address).map(|mut e| f(e.value_mut()))
    }

    /// Remove every token where `source == degen` and `now - spotted_at > ttl_ms`.
    /// Returns the removed addresses so callers can drop associated scorer state.
    pub fn evict_expired(&self, now_ms: u64, ttl_ms: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .tokens
            .iter()
            .filter(|e| {
                let t = e.value();
                t.source == Source::Degen && now_ms.saturating_sub(t.spotted_at) > ttl_ms
            })
            .map(|e| e.key().clone())
            .collect();
        for addr in &expired {
            self.tokens.remove(addr);
        }
        expired
    }

    /// Remove every degen token (used by purge). Holder tokens and the
    /// blacklist are untouched — the blacklist never lives here. Returns the
    /// removed addresses so callers can drop associated scorer state.
    pub fn purge_degen(&self) -> Vec<String> {
        let degen: Vec<String> = self
            .tokens
            .iter()
            .filter(|e| e.value().source == Source::Degen)
            .map(|e| e.key().clone())
            .collect();
        for addr in &degen {
            self.tokens.remove(addr);
        }
        degen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_ms;

    fn degen(addr: &str, spotted_at: u64) -> Token {
        Token::new_degen(addr.to_string(), "Foo".into(), "FOO".into(), "solana".into(), None, 1000.0, spotted_at)
    }

    #[test]
    fn mutate_sees_previous_and_new_value_together() {
        let store = TokenStore::new();
        store.upsert(degen("a", now_ms()));

        let crossed = store
            .mutate("a", |t| {
                let prev = t.peak_multiplier;
                t.current_mc = 1300.0;
                let new_mult = t.multiplier();
                if new_mult > t.peak_multiplier {
                    t.peak_multiplier = new_mult;
                }
                prev < 1.3 && t.peak_multiplier >= 1.3
            })
            .unwrap();
        assert!(crossed);
    }

    #[test]
    fn evict_expired_leaves_holder_tokens() {
        let store = TokenStore::new();
        let old = now_ms().saturating_sub(3 * 60 * 60 * 1000);
        store.upsert(degen("old-degen", old));
        let mut holder = degen("old-holder", old);
        holder.source = Source::Holder;
        store.upsert(holder);

        let evicted = store.evict_expired(now_ms(), 2 * 60 * 60 * 1000);
        assert_eq!(evicted, vec!["old-degen".to_string()]);
        assert!(store.contains("old-holder"));
    }

    #[test]
    fn purge_degen_preserves_holder_tokens() {
        let store = TokenStore::new();
        store.upsert(degen("d1", now_ms()));
        let mut h = degen("h1", now_ms());
        h.source = Source::Holder;
        store.upsert(h);

        let removed = store.purge_degen();
        assert_eq!(removed, vec!["d1".to_string()]);
        assert!(!store.contains("d1"));
        assert!(store.contains("h1"));
    }
}
