use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use realestate_ai::audit::AuditLogger;
use realestate_ai::auth::{AuthService, InMemoryUserRepository, TokenService, UserRepository};
use realestate_ai::config::AppConfig;
use realestate_ai::error::AppError;
use realestate_ai::ingestion::{
    run_ingestion, CacheInvalidator, HttpCacheInvalidator, HttpPermitVerifier, IngestionError,
    IngestionSummary, ListingWriter, LocalCacheInvalidator, NoopInvalidator, PermitVerifier,
    ServicePermitVerifier,
};
use realestate_ai::listing_writer::ListingWriterService;
use realestate_ai::marketing::mailer_from_config;
use realestate_ai::moderation::ModerationService;
use realestate_ai::payments::{
    BankEscrowClient, InMemoryPaymentRepository, PaymentDeps, PaymentService, StripeClient,
};
use realestate_ai::pdpl::{ConsentRepository, DsrService, InMemoryConsentLedger};
use realestate_ai::permits::{provider_for, PermitService};
use realestate_ai::search::{ConsentGate, ListingStore, SearchCache, SearchState};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Everything a single ingestion pass needs.
pub(crate) struct IngestionRuntime {
    client: reqwest::Client,
    source_url: Option<String>,
    writer: ListingWriter,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl IngestionRuntime {
    /// Remote permit checks and remote cache flushes when their URLs are
    /// configured; otherwise the in-process permit service and `local_cache`.
    pub(crate) fn build(
        config: &AppConfig,
        store: Arc<ListingStore>,
        permits: Arc<PermitService>,
        local_cache: Option<Arc<SearchCache>>,
    ) -> Self {
        let verifier: Arc<dyn PermitVerifier> = match &config.ingestion.permits_check_url {
            Some(url) => Arc::new(HttpPermitVerifier::new(url.clone())),
            None => Arc::new(ServicePermitVerifier::new(permits)),
        };
        let invalidator: Arc<dyn CacheInvalidator> =
            match (&config.ingestion.search_service_url, local_cache) {
                (Some(url), _) => Arc::new(HttpCacheInvalidator::new(
                    url,
                    config.ingestion.search_admin_key.clone(),
                )),
                (None, Some(cache)) => Arc::new(LocalCacheInvalidator::new(cache)),
                (None, None) => Arc::new(NoopInvalidator),
            };

        Self {
            client: reqwest::Client::new(),
            source_url: config.ingestion.source_url.clone(),
            writer: ListingWriter::new(store, verifier),
            invalidator,
        }
    }

    pub(crate) async fn run_once(&self) -> Result<IngestionSummary, IngestionError> {
        run_ingestion(
            &self.client,
            self.source_url.as_deref(),
            &self.writer,
            self.invalidator.as_ref(),
            Utc::now(),
        )
        .await
    }
}

/// Opens the listing store named by the config, seeding demo listings
/// unless seeding is switched off.
pub(crate) fn open_listing_store(config: &AppConfig) -> Result<Arc<ListingStore>, AppError> {
    let store = ListingStore::open_optional(config.search.database_path.as_deref())?;
    if config.search.database_path.is_none() {
        warn!("SEARCH_DATABASE_PATH not set, listings are kept in memory");
    }
    if !config.search.skip_seed {
        let inserted = store.seed(Utc::now())?;
        info!(inserted, "search.seed");
    }
    Ok(Arc::new(store))
}

/// The services behind every router, wired with in-memory repositories.
pub(crate) struct Services {
    pub(crate) tokens: Arc<TokenService>,
    pub(crate) auth: Arc<AuthService>,
    pub(crate) permits: Arc<PermitService>,
    pub(crate) listing_writer: Arc<ListingWriterService>,
    pub(crate) moderation: Arc<ModerationService>,
    pub(crate) consent: Arc<dyn ConsentRepository>,
    pub(crate) dsr: Arc<DsrService>,
    pub(crate) audit: Arc<AuditLogger>,
    pub(crate) payments: Arc<PaymentService<InMemoryPaymentRepository>>,
    pub(crate) search: SearchState,
    pub(crate) ingestion: Arc<IngestionRuntime>,
}

impl Services {
    pub(crate) fn build(config: &AppConfig) -> Result<Self, AppError> {
        let users: Arc<dyn UserRepository> = Arc::new(InMemoryUserRepository::new());
        let consent: Arc<dyn ConsentRepository> = Arc::new(InMemoryConsentLedger::new());
        let audit = Arc::new(AuditLogger::new(config.audit.log_path.clone()));
        let tokens = Arc::new(TokenService::new(
            &config.auth.jwt_secret,
            config.auth.token_ttl,
        ));

        let auth = Arc::new(AuthService::new(
            users.clone(),
            tokens.clone(),
            mailer_from_config(&config.marketing),
            config.auth.clone(),
        ));
        if let Err(err) = auth.seed_default_agent() {
            warn!(error = %err, "auth.seed_failed");
        }

        let permits = Arc::new(PermitService::new(provider_for(&config.permits)));
        let payments = Arc::new(PaymentService::new(
            Arc::new(InMemoryPaymentRepository::new()),
            PaymentDeps {
                users: users.clone(),
                consent: consent.clone(),
                stripe: Arc::new(StripeClient::from_config(&config.payments)),
                escrow: Arc::new(BankEscrowClient::from_config(&config.payments)),
                audit: audit.clone(),
            },
            config.payments.clone(),
        ));

        let store = open_listing_store(config)?;
        let cache = Arc::new(SearchCache::new());
        let search = SearchState {
            store: store.clone(),
            cache: cache.clone(),
            gate: Arc::new(ConsentGate::from_config(&config.search, consent.clone())),
            admin_key: config.search.admin_key.clone(),
            cache_ttl: config.search.cache_ttl,
        };
        let ingestion = Arc::new(IngestionRuntime::build(
            config,
            store,
            permits.clone(),
            Some(cache),
        ));

        Ok(Self {
            tokens,
            auth,
            listing_writer: Arc::new(ListingWriterService::new(permits.clone())),
            permits,
            moderation: Arc::new(ModerationService::new(config.moderation.clone())),
            dsr: Arc::new(DsrService::new(users, consent.clone())),
            consent,
            audit,
            payments,
            search,
            ingestion,
        })
    }
}
