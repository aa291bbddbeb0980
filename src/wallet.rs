//! Wallet custody boundary.
//!
//! Durable storage and the OS secret-encryption primitive live behind small
//! trait contracts ([`WalletStore`], [`SettingsStore`], [`SecretCipher`]);
//! the embedder supplies real implementations, the in-memory stores here
//! back tests. [`WalletManager`] owns the import/generate/delete lifecycle
//! and signer resolution. Decrypted key material only exists transiently
//! inside resolution; both the intermediate base58 string and the decoded
//! buffer are zeroed once the keypair is built.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::rpc::ChainClient;
use crate::types::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletRole {
    /// Imported wallet holding the operating funds.
    Custody,
    /// Generated wallet used for campaign legs.
    Worker,
}

#[derive(Debug, Clone)]
pub struct WalletRecord {
    pub id: String,
    pub pubkey: Pubkey,
    pub encrypted_secret: String,
    pub role: WalletRole,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Listing view; never carries secret material.
#[derive(Debug, Clone)]
pub struct WalletInfo {
    pub id: String,
    pub pubkey: Pubkey,
    pub role: WalletRole,
    pub label: String,
    pub balance_lamports: u64,
    pub created_at: DateTime<Utc>,
}

pub trait WalletStore: Send + Sync {
    fn insert(&self, record: WalletRecord) -> Result<()>;
    fn get(&self, id: &str) -> Option<WalletRecord>;
    fn find_by_pubkey(&self, pubkey: &Pubkey) -> Option<WalletRecord>;
    fn list(&self) -> Vec<WalletRecord>;
    fn delete(&self, id: &str) -> Result<()>;
}

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// OS-level secret encryption primitive.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

#[derive(Default)]
pub struct MemoryWalletStore {
    records: Mutex<Vec<WalletRecord>>,
}

impl WalletStore for MemoryWalletStore {
    fn insert(&self, record: WalletRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| EngineError::Conflict("wallet store poisoned".into()))?
            .push(record);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<WalletRecord> {
        self.records
            .lock()
            .ok()?
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    fn find_by_pubkey(&self, pubkey: &Pubkey) -> Option<WalletRecord> {
        self.records
            .lock()
            .ok()?
            .iter()
            .find(|r| r.pubkey == *pubkey)
            .cloned()
    }

    fn list(&self) -> Vec<WalletRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| EngineError::Conflict("wallet store poisoned".into()))?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(EngineError::NotFound(format!("wallet {id}")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }
}

/// Resolves signing material for a wallet id. Split out as a trait so the
/// execution engines can be tested without a real store or cipher.
pub trait SignerResolver: Send + Sync {
    fn signer(&self, wallet_id: &str) -> Result<Keypair>;
    fn pubkey_of(&self, wallet_id: &str) -> Result<Pubkey>;
}

pub struct WalletManager {
    store: Arc<dyn WalletStore>,
    cipher: Arc<dyn SecretCipher>,
    chain: Arc<dyn ChainClient>,
}

impl WalletManager {
    pub fn new(
        store: Arc<dyn WalletStore>,
        cipher: Arc<dyn SecretCipher>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self { store, cipher, chain }
    }

    /// Import a wallet from a base58 secret key. Re-importing a pubkey that
    /// is already stored is rejected.
    pub fn import_wallet(&self, secret_bs58: &str, label: &str) -> Result<WalletInfo> {
        let mut secret = bs58::decode(secret_bs58.trim())
            .into_vec()
            .map_err(|e| EngineError::Config(format!("secret key is not valid base58: {e}")))?;
        let keypair = Keypair::from_bytes(&secret).map_err(|e| {
            secret.fill(0);
            EngineError::Config(format!("secret key is not a valid ed25519 keypair: {e}"))
        })?;
        secret.fill(0);

        let pubkey = keypair.pubkey();
        if self.store.find_by_pubkey(&pubkey).is_some() {
            return Err(EngineError::Conflict(format!(
                "wallet {pubkey} is already imported"
            )));
        }

        let record = self.store_keypair(&keypair, WalletRole::Custody, label.to_string())?;
        info!(wallet = %pubkey, id = %record.id, "imported wallet");
        Ok(self.info_with_balance(record, 0))
    }

    /// Generate `count` fresh worker wallets labelled `"{prefix} {n}"`.
    pub fn generate_wallets(&self, count: usize, prefix: &str) -> Result<Vec<WalletInfo>> {
        if count == 0 {
            return Err(EngineError::Config("count must be at least 1".into()));
        }
        let mut out = Vec::with_capacity(count);
        for n in 1..=count {
            let keypair = Keypair::new();
            let record =
                self.store_keypair(&keypair, WalletRole::Worker, format!("{prefix} {n}"))?;
            out.push(self.info_with_balance(record, 0));
        }
        info!(count, "generated worker wallets");
        Ok(out)
    }

    pub fn list(&self) -> Vec<WalletRecord> {
        self.store.list()
    }

    pub async fn list_with_balances(&self) -> Vec<WalletInfo> {
        let records = self.store.list();
        let balances = futures::future::join_all(
            records.iter().map(|r| self.chain.get_balance(&r.pubkey)),
        )
        .await;

        records
            .into_iter()
            .zip(balances)
            .map(|(record, balance)| {
                let lamports = match balance {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(wallet = %record.pubkey, error = %e, "balance read failed");
                        0
                    }
                };
                self.info_with_balance(record, lamports)
            })
            .collect()
    }

    pub fn delete_wallet(&self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        info!(id, "deleted wallet");
        Ok(())
    }

    pub fn record(&self, id: &str) -> Result<WalletRecord> {
        self.store
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("wallet {id}")))
    }

    fn store_keypair(
        &self,
        keypair: &Keypair,
        role: WalletRole,
        label: String,
    ) -> Result<WalletRecord> {
        let secret_bs58 = keypair.to_base58_string();
        let encrypted = self.cipher.encrypt(&secret_bs58);
        let mut encoded = secret_bs58.into_bytes();
        encoded.fill(0);
        let encrypted_secret = encrypted?;
        let record = WalletRecord {
            id: generate_id(),
            pubkey: keypair.pubkey(),
            encrypted_secret,
            role,
            label,
            created_at: Utc::now(),
        };
        self.store.insert(record.clone())?;
        Ok(record)
    }

    fn info_with_balance(&self, record: WalletRecord, balance_lamports: u64) -> WalletInfo {
        WalletInfo {
            id: record.id,
            pubkey: record.pubkey,
            role: record.role,
            label: record.label,
            balance_lamports,
            created_at: record.created_at,
        }
    }
}

impl SignerResolver for WalletManager {
    fn signer(&self, wallet_id: &str) -> Result<Keypair> {
        let record = self.record(wallet_id)?;

        let secret_bs58 = match self.cipher.decrypt(&record.encrypted_secret) {
            Ok(plain) => plain,
            Err(_) => {
                // Records written before encryption was introduced hold the
                // bare base58 secret. Flag every use for the audit trail.
                warn!(wallet = %record.pubkey, id = %record.id, legacy = true,
                    "secret stored as legacy plaintext, resolve via fallback");
                record.encrypted_secret.clone()
            }
        };

        let decoded = bs58::decode(secret_bs58.trim()).into_vec();
        let mut encoded = secret_bs58.into_bytes();
        encoded.fill(0);
        let mut secret = decoded.map_err(|e| {
            EngineError::Config(format!("stored secret for wallet {wallet_id} is corrupt: {e}"))
        })?;
        let keypair = Keypair::from_bytes(&secret).map_err(|e| {
            secret.fill(0);
            EngineError::Config(format!("stored secret for wallet {wallet_id} is corrupt: {e}"))
        })?;
        secret.fill(0);

        if keypair.pubkey() != record.pubkey {
            return Err(EngineError::Config(format!(
                "stored secret for wallet {wallet_id} does not match its pubkey"
            )));
        }
        Ok(keypair)
    }

    fn pubkey_of(&self, wallet_id: &str) -> Result<Pubkey> {
        Ok(self.record(wallet_id)?.pubkey)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use solana_sdk::{hash::Hash, signature::Signature, transaction::VersionedTransaction};

    use crate::rpc::ObservedTx;

    /// Reversible toy cipher: prefixes ciphertext so decrypt can tell
    /// encrypted values from legacy plaintext.
    pub struct TaggedCipher;

    impl SecretCipher for TaggedCipher {
        fn encrypt(&self, plaintext: &str) -> Result<String> {
            Ok(format!("enc:{plaintext}"))
        }

        fn decrypt(&self, ciphertext: &str) -> Result<String> {
            ciphertext
                .strip_prefix("enc:")
                .map(str::to_string)
                .ok_or_else(|| EngineError::Config("not encrypted".into()))
        }
    }

    /// ChainClient that answers every read with fixed values and confirms
    /// every broadcast.
    pub struct StaticChainClient {
        pub balance: u64,
        pub token_balance: u64,
    }

    impl Default for StaticChainClient {
        fn default() -> Self {
            Self { balance: 1_000_000_000, token_balance: 0 }
        }
    }

    #[async_trait]
    impl ChainClient for StaticChainClient {
        async fn latest_blockhash(&self) -> Result<Hash> {
            Ok(Hash::new_unique())
        }

        async fn get_balance(&self, _address: &Pubkey) -> Result<u64> {
            Ok(self.balance)
        }

        async fn get_account_data(&self, _address: &Pubkey) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn get_token_balance(&self, _token_account: &Pubkey) -> Result<u64> {
            Ok(self.token_balance)
        }

        async fn send_and_confirm(&self, tx: &VersionedTransaction) -> Result<Signature> {
            let _ = tx;
            Ok(Signature::default())
        }

        async fn recent_transactions(
            &self,
            _address: &Pubkey,
            _limit: usize,
        ) -> Result<Vec<ObservedTx>> {
            Ok(Vec::new())
        }
    }

    /// Route test logs through `RUST_LOG` when set; safe to call repeatedly.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    pub fn manager() -> WalletManager {
        init_tracing();
        WalletManager::new(
            Arc::new(MemoryWalletStore::default()),
            Arc::new(TaggedCipher),
            Arc::new(StaticChainClient::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::manager;
    use super::*;

    #[test]
    fn import_rejects_garbage_and_duplicates() {
        let manager = manager();
        assert!(manager.import_wallet("not-base58-%%%", "main").is_err());

        let keypair = Keypair::new();
        let secret = keypair.to_base58_string();
        let info = manager.import_wallet(&secret, "main").unwrap();
        assert_eq!(info.pubkey, keypair.pubkey());
        assert_eq!(info.role, WalletRole::Custody);

        let err = manager.import_wallet(&secret, "again").unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn generated_wallets_resolve_to_matching_signers() {
        let manager = manager();
        let wallets = manager.generate_wallets(3, "worker").unwrap();
        assert_eq!(wallets.len(), 3);
        assert_eq!(wallets[2].label, "worker 3");

        for info in &wallets {
            let keypair = manager.signer(&info.id).unwrap();
            assert_eq!(keypair.pubkey(), info.pubkey);
        }
    }

    #[test]
    fn legacy_plaintext_secret_resolves_through_fallback() {
        let manager = manager();
        let keypair = Keypair::new();
        let record = WalletRecord {
            id: "legacy".into(),
            pubkey: keypair.pubkey(),
            // Stored before encryption existed: bare base58.
            encrypted_secret: keypair.to_base58_string(),
            role: WalletRole::Worker,
            label: "old".into(),
            created_at: Utc::now(),
        };
        manager.store.insert(record).unwrap();

        let resolved = manager.signer("legacy").unwrap();
        assert_eq!(resolved.pubkey(), keypair.pubkey());
    }

    #[test]
    fn delete_missing_wallet_is_not_found() {
        let manager = manager();
        assert!(matches!(
            manager.delete_wallet("nope"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn listing_includes_balances() {
        let manager = manager();
        manager.generate_wallets(2, "w").unwrap();
        let infos = manager.list_with_balances().await;
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.balance_lamports == 1_000_000_000));
    }
}
