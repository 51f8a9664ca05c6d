use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ciborium::ser::into_writer;
use ciborium::value::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::config::ConnectionOptions;
use crate::cose::{CoseParseError, CoseSign1};
use crate::fetch::{FetchError, Fetcher};
use crate::rules::BusinessRules;
use crate::storage::{FileStorage, StorageError};
use crate::trustlist::{KeyParseError, PublicKey, TrustList};
use crate::valuesets::ValueSets;

/// Errors raised while refreshing or loading a signed bundle.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No trust anchor was configured for this store.
    #[error("no trust anchor configured")]
    AnchorMissing,
    /// The configured anchor could not be turned into a public key.
    #[error("cannot parse the trust anchor: {0}")]
    AnchorInvalid(#[from] KeyParseError),
    /// The network capability failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// The endpoint answered with a non-success status.
    #[error("endpoint answered with status {0}")]
    HttpStatus(u16),
    /// The signature object is not a COSE_Sign1 structure.
    #[error("cannot parse the signature object: {0}")]
    SignatureObject(#[from] CoseParseError),
    /// The bundle signature does not verify under the anchor.
    #[error("the bundle signature does not verify under the trust anchor")]
    SignatureInvalid,
    /// The bundle payload does not decode.
    #[error("cannot decode the bundle payload: {0}")]
    Decode(String),
    /// The bundle window does not contain the current time.
    #[error("the bundle validity window does not contain the current time")]
    OutsideValidityWindow,
    /// The storage capability failed.
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
    /// Nothing is cached and the last refresh failed.
    #[error("no bundle available: {0}")]
    Unavailable(String),
}

/// A payload type distributed as a COSE-signed CBOR bundle with its own
/// validity window.
pub trait SignedBundle: Sized + Send + Sync + 'static {
    /// Stable name of the persisted file for this bundle kind.
    const STORAGE_NAME: &'static str;

    /// Decodes the bundle from the signed payload bytes.
    fn decode(payload: &[u8]) -> Result<Self, StoreError>;
    /// POSIX seconds from which the bundle may be used.
    fn valid_from(&self) -> u64;
    /// POSIX seconds up to which the bundle may be used.
    fn valid_until(&self) -> u64;

    /// Whether the bundle may be used at `now`.
    fn is_fresh(&self, now: u64) -> bool {
        self.valid_from() <= now && now <= self.valid_until()
    }
}

impl SignedBundle for TrustList {
    const STORAGE_NAME: &'static str = "trustlist.cbor";

    fn decode(payload: &[u8]) -> Result<Self, StoreError> {
        TrustList::from_cbor(payload).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn valid_from(&self) -> u64 {
        self.valid_from
    }

    fn valid_until(&self) -> u64 {
        self.valid_until
    }
}

impl SignedBundle for BusinessRules {
    const STORAGE_NAME: &'static str = "business_rules.cbor";

    fn decode(payload: &[u8]) -> Result<Self, StoreError> {
        ciborium::de::from_reader(payload).map_err(|e: ciborium::de::Error<std::io::Error>| {
            StoreError::Decode(e.to_string())
        })
    }

    fn valid_from(&self) -> u64 {
        self.valid_from
    }

    fn valid_until(&self) -> u64 {
        self.valid_until
    }
}

impl SignedBundle for ValueSets {
    const STORAGE_NAME: &'static str = "value_sets.cbor";

    fn decode(payload: &[u8]) -> Result<Self, StoreError> {
        ciborium::de::from_reader(payload).map_err(|e: ciborium::de::Error<std::io::Error>| {
            StoreError::Decode(e.to_string())
        })
    }

    fn valid_from(&self) -> u64 {
        self.valid_from
    }

    fn valid_until(&self) -> u64 {
        self.valid_until
    }
}

struct StoreState<B> {
    bundle: Option<Arc<B>>,
    disk_checked: bool,
}

/// The fetch/verify/cache/persist machinery shared by the trust list,
/// business rules and value sets stores.
///
/// The cached bundle is swapped atomically; readers always see either the
/// previous or the new bundle, never a mix. Refreshes are serialized and
/// concurrent callers coalesce onto the refresh already in flight.
pub struct SignedStore<B> {
    options: ConnectionOptions,
    fetcher: Arc<dyn Fetcher>,
    storage: Option<Arc<dyn FileStorage>>,
    state: RwLock<StoreState<B>>,
    refresh_gate: Mutex<()>,
    refresh_epoch: AtomicU64,
}

impl<B: SignedBundle> SignedStore<B> {
    /// Creates a store; nothing is loaded until first use.
    pub fn new(
        options: ConnectionOptions,
        fetcher: Arc<dyn Fetcher>,
        storage: Option<Arc<dyn FileStorage>>,
    ) -> Self {
        Self {
            options,
            fetcher,
            storage,
            state: RwLock::new(StoreState {
                bundle: None,
                disk_checked: false,
            }),
            refresh_gate: Mutex::new(()),
            refresh_epoch: AtomicU64::new(0),
        }
    }

    /// Returns the bundle to use at `now`.
    ///
    /// A fresh cached bundle is returned as-is. Otherwise one refresh is
    /// attempted; if it fails the stale cached bundle is still returned so
    /// that lookups keep running against the best available data, and only
    /// a store with no cache at all reports an error.
    pub async fn bundle(&self, now: u64) -> Result<Arc<B>, StoreError> {
        self.load_from_disk_once().await;

        if let Some(bundle) = self.cached().await {
            if bundle.is_fresh(now) {
                return Ok(bundle);
            }
        }

        let refresh_failure = match self.refresh(now, false).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(store = B::STORAGE_NAME, error = %e, "bundle refresh failed");
                Some(e)
            }
        };

        match self.cached().await {
            Some(bundle) => Ok(bundle),
            None => Err(StoreError::Unavailable(
                refresh_failure
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no cached bundle".to_string()),
            )),
        }
    }

    /// Forces a refresh attempt, regardless of freshness.
    ///
    /// Callers racing an in-flight refresh coalesce onto its outcome. A
    /// failed refresh never touches the cached bundle.
    pub async fn update(&self, now: u64) -> Result<(), StoreError> {
        self.load_from_disk_once().await;
        self.refresh(now, true).await
    }

    async fn cached(&self) -> Option<Arc<B>> {
        self.state.read().await.bundle.clone()
    }

    async fn refresh(&self, now: u64, force: bool) -> Result<(), StoreError> {
        let seen_epoch = self.refresh_epoch.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;

        // a refresh completed while this caller waited for the gate
        if self.refresh_epoch.load(Ordering::Acquire) != seen_epoch {
            return Ok(());
        }
        if !force {
            if let Some(bundle) = self.cached().await {
                if bundle.is_fresh(now) {
                    return Ok(());
                }
            }
        }

        let content = self.fetch_body(&self.options.url).await?;
        let signature = self.fetch_body(&self.options.signature_url).await?;
        let bundle = verify_and_decode::<B>(&content, &signature, &self.options.anchor, Some(now))?;

        {
            let mut state = self.state.write().await;
            state.bundle = Some(Arc::new(bundle));
        }
        self.refresh_epoch.fetch_add(1, Ordering::Release);

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.write(B::STORAGE_NAME, &persisted(&content, &signature)).await {
                tracing::warn!(store = B::STORAGE_NAME, error = %e, "could not persist bundle");
            }
        }

        Ok(())
    }

    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        let response = self.fetcher.get(url).await?;
        if !response.is_success() {
            return Err(StoreError::HttpStatus(response.status));
        }
        Ok(response.body)
    }

    async fn load_from_disk_once(&self) {
        {
            let state = self.state.read().await;
            if state.disk_checked {
                return;
            }
        }
        let mut state = self.state.write().await;
        if state.disk_checked {
            return;
        }
        state.disk_checked = true;

        let storage = match &self.storage {
            Some(storage) => storage,
            None => return,
        };
        match load_persisted::<B>(storage.as_ref(), &self.options.anchor).await {
            Ok(Some(bundle)) => state.bundle = Some(Arc::new(bundle)),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(store = B::STORAGE_NAME, error = %e, "ignoring persisted bundle");
            }
        }
    }
}

/// Verifies a fetched `[content, signature object]` pair against the anchor
/// and decodes the bundle. `check_window` carries the current time during a
/// refresh; loads from disk skip the window check and classify freshness at
/// use time instead.
fn verify_and_decode<B: SignedBundle>(
    content: &[u8],
    signature_object: &[u8],
    anchor: &str,
    check_window: Option<u64>,
) -> Result<B, StoreError> {
    if anchor.is_empty() {
        return Err(StoreError::AnchorMissing);
    }
    let anchor_key = PublicKey::from_base64(anchor)?;

    let cose = CoseSign1::from_bytes(signature_object)?;
    let alg = match cose.header.alg {
        Some(alg) => alg,
        None => return Err(StoreError::SignatureInvalid),
    };
    // the signature object may embed the payload or detach it, in which
    // case the separately fetched content completes the Sig_structure
    let signed_bytes = cose.sig_structure(Some(content));
    if !anchor_key.verify(alg, &signed_bytes, &cose.signature) {
        return Err(StoreError::SignatureInvalid);
    }

    let payload = cose.payload.as_deref().unwrap_or(content);
    let bundle = B::decode(payload)?;

    if let Some(now) = check_window {
        if !bundle.is_fresh(now) {
            return Err(StoreError::OutsideValidityWindow);
        }
    }
    Ok(bundle)
}

/// The persisted record: a definite CBOR array of the raw content and the
/// raw signature object, so that loading re-runs the exact verification a
/// refresh performs.
fn persisted(content: &[u8], signature_object: &[u8]) -> Vec<u8> {
    let record = Value::Array(vec![
        Value::Bytes(content.to_vec()),
        Value::Bytes(signature_object.to_vec()),
    ]);
    let mut encoded = Vec::new();
    into_writer(&record, &mut encoded).unwrap();
    encoded
}

async fn load_persisted<B: SignedBundle>(
    storage: &dyn FileStorage,
    anchor: &str,
) -> Result<Option<B>, StoreError> {
    let record = match storage.read(B::STORAGE_NAME).await? {
        Some(record) => record,
        None => return Ok(None),
    };
    let root: Value = ciborium::de::from_reader(record.as_slice())
        .map_err(|e: ciborium::de::Error<std::io::Error>| StoreError::Decode(e.to_string()))?;
    let parts = root
        .as_array()
        .filter(|parts| parts.len() == 2)
        .ok_or_else(|| StoreError::Decode("persisted record is not a pair".to_string()))?;
    let content = parts[0]
        .as_bytes()
        .ok_or_else(|| StoreError::Decode("persisted content is not binary".to_string()))?;
    let signature = parts[1]
        .as_bytes()
        .ok_or_else(|| StoreError::Decode("persisted signature is not binary".to_string()))?;

    verify_and_decode::<B>(content, signature, anchor, None).map(Some)
}
