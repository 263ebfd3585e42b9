//! The sync pipeline.
//!
//! One pass gathers candidate entities from local storage and the configured
//! enrichment providers, skips everything the fingerprint registry already
//! knows, health-scores fresh contacts, pushes survivors to the CRM (the
//! system of record; a push failure there aborts), and finally fans
//! surviving contacts out to the marketing platforms best-effort. Every push
//! lands in the activity log, every skip in the duplicate log, so a re-run
//! with unchanged source data writes nothing upstream.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use rex_providers::{
    contacts_csv, ConstantContactAdapter, EnrichmentAdapter, EntityKind, EntityRecord,
    MailchimpAdapter, Provider, ProviderAdapter, ProviderError, RealNexAdapter,
};
use rex_store::{ContactRecord, RexStore, SettingsRecord};

use crate::health;
use crate::scope::SyncScope;

/// Error taxonomy for a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing {what}; set it in settings")]
    MissingCredential { what: &'static str },
    #[error("crm push failed for {label}: {source}")]
    CrmPush {
        label: String,
        #[source]
        source: ProviderError,
    },
    #[error("entity could not be serialized: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What happened to one candidate entity during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Pushed to the CRM individually.
    Pushed,
    /// Included in the batched CSV import of enrichment contacts.
    Imported,
    /// Already in the fingerprint registry; skipped and logged.
    Duplicate,
}

/// Public struct `EntityOutcome` used across Rex components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityOutcome {
    pub kind: String,
    pub label: String,
    pub disposition: Disposition,
}

/// One provider-level degradation recorded during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub detail: String,
}

/// Public struct `SyncReport` used across Rex components.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub scope: String,
    pub candidates: usize,
    pub crm_pushes: usize,
    pub imported_contacts: usize,
    pub marketing_pushes: usize,
    pub duplicates_skipped: usize,
    pub fetch_failures: Vec<ProviderFailure>,
    pub marketing_failures: Vec<ProviderFailure>,
    pub entities: Vec<EntityOutcome>,
}

impl SyncReport {
    fn new(scope: SyncScope) -> Self {
        Self {
            scope: scope.as_str().to_string(),
            candidates: 0,
            crm_pushes: 0,
            imported_contacts: 0,
            marketing_pushes: 0,
            duplicates_skipped: 0,
            fetch_failures: Vec::new(),
            marketing_failures: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// Human-readable one-paragraph outcome for chat replies.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "Synced {} of {} candidates to RealNex",
            self.crm_pushes + self.imported_contacts,
            self.candidates
        )];
        if self.duplicates_skipped > 0 {
            parts.push(format!("skipped {} duplicates", self.duplicates_skipped));
        }
        if self.marketing_pushes > 0 {
            parts.push(format!(
                "pushed {} contacts to marketing lists",
                self.marketing_pushes
            ));
        }
        if !self.fetch_failures.is_empty() {
            parts.push(format!(
                "{} provider fetches failed",
                self.fetch_failures.len()
            ));
        }
        if !self.marketing_failures.is_empty() {
            parts.push(format!(
                "{} marketing pushes failed",
                self.marketing_failures.len()
            ));
        }
        format!("{}.", parts.join("; "))
    }
}

/// The provider adapters one `SyncService` fans out to.
pub struct SyncAdapters {
    pub realnex: RealNexAdapter,
    pub mailchimp: MailchimpAdapter,
    pub constant_contact: ConstantContactAdapter,
    pub enrichment: Vec<EnrichmentAdapter>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CandidateSource {
    Local,
    Enrichment,
}

/// Dependency-injected sync orchestrator.
pub struct SyncService {
    store: Arc<RexStore>,
    adapters: SyncAdapters,
}

impl SyncService {
    pub fn new(store: Arc<RexStore>, adapters: SyncAdapters) -> Self {
        Self { store, adapters }
    }

    /// The RealNex adapter this service pushes through. The command layer
    /// reuses it for RealBlast campaign sends.
    pub fn realnex_adapter(&self) -> &RealNexAdapter {
        &self.adapters.realnex
    }

    /// The Mailchimp adapter this service fans out to. The command layer
    /// reuses it for campaign create-and-send.
    pub fn mailchimp_adapter(&self) -> &MailchimpAdapter {
        &self.adapters.mailchimp
    }

    /// Runs one full sync pass for `user_id` over `scope`.
    pub async fn sync(&self, user_id: &str, scope: SyncScope) -> Result<SyncReport, SyncError> {
        let (realnex_token, settings, group_id) = self.crm_credentials(user_id)?;
        tracing::info!(user_id, scope = %scope, "starting sync");
        let mut report = SyncReport::new(scope);

        let candidates = self
            .collect_candidates(user_id, scope, &settings, &mut report)
            .await?;
        report.candidates = candidates.len();

        let survivors = self.filter_duplicates(user_id, candidates, &mut report)?;

        self.push_to_crm(user_id, &realnex_token, &group_id, &survivors, &mut report)
            .await?;

        if scope.includes_marketing() {
            self.fan_out_marketing(user_id, &settings, &survivors, &mut report)
                .await?;
        }

        tracing::info!(
            user_id,
            scope = %scope,
            pushed = report.crm_pushes,
            imported = report.imported_contacts,
            marketing = report.marketing_pushes,
            duplicates = report.duplicates_skipped,
            "sync finished"
        );
        Ok(report)
    }

    /// Pushes one entity through the same registry/health/push/audit path as
    /// a full pass. Used by OCR ingestion and manual entry.
    pub async fn sync_entity(
        &self,
        user_id: &str,
        entity: &EntityRecord,
    ) -> Result<Disposition, SyncError> {
        let (realnex_token, _, group_id) = self.crm_credentials(user_id)?;
        let fingerprint = entity.fingerprint();
        if self.store.has_synced_fingerprint(user_id, &fingerprint)? {
            self.store
                .log_duplicate(user_id, &fingerprint, &serde_json::to_string(entity)?)?;
            return Ok(Disposition::Duplicate);
        }
        self.log_contact_health(user_id, entity)?;
        if let Err(error) = self
            .adapters
            .realnex
            .push(&realnex_token, entity, &group_id)
            .await
        {
            tracing::error!(user_id, label = %entity.label(), error = %error, "crm push failed");
            return Err(SyncError::CrmPush {
                label: entity.label(),
                source: error,
            });
        }
        self.store.record_synced_fingerprint(user_id, &fingerprint)?;
        self.log_crm_push(user_id, entity, &group_id)?;
        Ok(Disposition::Pushed)
    }

    fn crm_credentials(
        &self,
        user_id: &str,
    ) -> Result<(String, SettingsRecord, String), SyncError> {
        let realnex_token = self
            .store
            .token(user_id, Provider::RealNex.as_str())?
            .ok_or(SyncError::MissingCredential {
                what: "realnex token",
            })?;
        let settings = self.store.settings(user_id)?;
        let group_id = settings
            .realnex_group_id
            .clone()
            .ok_or(SyncError::MissingCredential {
                what: "realnex group",
            })?;
        Ok((realnex_token, settings, group_id))
    }

    async fn collect_candidates(
        &self,
        user_id: &str,
        scope: SyncScope,
        settings: &SettingsRecord,
        report: &mut SyncReport,
    ) -> Result<Vec<(CandidateSource, EntityRecord)>, SyncError> {
        let mut candidates = Vec::new();
        if !scope.includes(EntityKind::Contact) {
            // Companies, properties, and spaces have no local table; their
            // candidates arrive only through the single-entity path.
            return Ok(candidates);
        }
        for contact in self.store.list_contacts(user_id)? {
            candidates.push((
                CandidateSource::Local,
                EntityRecord::Contact {
                    id: Some(contact.id),
                    name: contact.name,
                    email: contact.email,
                    phone: contact.phone,
                    company: None,
                },
            ));
        }
        for adapter in &self.adapters.enrichment {
            let provider = adapter.provider();
            let Some(token) = self.store.token(user_id, provider.as_str())? else {
                continue;
            };
            let Some(list_id) = enrichment_list_id(settings, provider) else {
                continue;
            };
            match adapter.fetch(&token, list_id).await {
                Ok(records) => {
                    tracing::debug!(
                        user_id,
                        provider = provider.as_str(),
                        count = records.len(),
                        "collected enrichment contacts"
                    );
                    candidates.extend(
                        records
                            .into_iter()
                            .map(|record| (CandidateSource::Enrichment, record)),
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        user_id,
                        provider = provider.as_str(),
                        error = %error,
                        "enrichment fetch failed; treating contribution as empty"
                    );
                    report.fetch_failures.push(ProviderFailure {
                        provider: provider.as_str().to_string(),
                        detail: error.to_string(),
                    });
                }
            }
        }
        Ok(candidates)
    }

    fn filter_duplicates(
        &self,
        user_id: &str,
        candidates: Vec<(CandidateSource, EntityRecord)>,
        report: &mut SyncReport,
    ) -> Result<Vec<(CandidateSource, String, EntityRecord)>, SyncError> {
        let mut survivors = Vec::new();
        let mut seen_this_pass = HashSet::new();
        for (source, entity) in candidates {
            let fingerprint = entity.fingerprint();
            if seen_this_pass.contains(&fingerprint)
                || self.store.has_synced_fingerprint(user_id, &fingerprint)?
            {
                self.store
                    .log_duplicate(user_id, &fingerprint, &serde_json::to_string(&entity)?)?;
                report.duplicates_skipped += 1;
                report.entities.push(EntityOutcome {
                    kind: entity.kind().as_str().to_string(),
                    label: entity.label(),
                    disposition: Disposition::Duplicate,
                });
                continue;
            }
            seen_this_pass.insert(fingerprint.clone());
            self.log_contact_health(user_id, &entity)?;
            survivors.push((source, fingerprint, entity));
        }
        Ok(survivors)
    }

    async fn push_to_crm(
        &self,
        user_id: &str,
        realnex_token: &str,
        group_id: &str,
        survivors: &[(CandidateSource, String, EntityRecord)],
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let mut import_batch = Vec::new();
        for (source, fingerprint, entity) in survivors {
            match source {
                CandidateSource::Local => {
                    if let Err(error) = self
                        .adapters
                        .realnex
                        .push(realnex_token, entity, group_id)
                        .await
                    {
                        tracing::error!(
                            user_id,
                            label = %entity.label(),
                            error = %error,
                            "crm push failed; aborting sync"
                        );
                        return Err(SyncError::CrmPush {
                            label: entity.label(),
                            source: error,
                        });
                    }
                    self.store.record_synced_fingerprint(user_id, fingerprint)?;
                    self.log_crm_push(user_id, entity, group_id)?;
                    report.crm_pushes += 1;
                    report.entities.push(EntityOutcome {
                        kind: entity.kind().as_str().to_string(),
                        label: entity.label(),
                        disposition: Disposition::Pushed,
                    });
                }
                CandidateSource::Enrichment => {
                    import_batch.push((fingerprint.clone(), entity.clone()));
                }
            }
        }

        if import_batch.is_empty() {
            return Ok(());
        }
        let records: Vec<EntityRecord> =
            import_batch.iter().map(|(_, entity)| entity.clone()).collect();
        let csv = contacts_csv(&records);
        if let Err(error) = self
            .adapters
            .realnex
            .import_contacts_csv(realnex_token, &csv)
            .await
        {
            tracing::error!(
                user_id,
                count = import_batch.len(),
                error = %error,
                "csv import of enrichment contacts failed; aborting sync"
            );
            return Err(SyncError::CrmPush {
                label: "enrichment contact import".to_string(),
                source: error,
            });
        }
        for (fingerprint, entity) in &import_batch {
            self.store
                .upsert_contact(&local_contact_record(user_id, entity))?;
            self.store.record_synced_fingerprint(user_id, fingerprint)?;
            report.entities.push(EntityOutcome {
                kind: entity.kind().as_str().to_string(),
                label: entity.label(),
                disposition: Disposition::Imported,
            });
        }
        report.imported_contacts = import_batch.len();
        self.store.log_activity(
            user_id,
            "sync_crm_data",
            &json!({ "num_contacts": import_batch.len() }).to_string(),
        )?;
        Ok(())
    }

    async fn fan_out_marketing(
        &self,
        user_id: &str,
        settings: &SettingsRecord,
        survivors: &[(CandidateSource, String, EntityRecord)],
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let contacts: Vec<&EntityRecord> = survivors
            .iter()
            .filter(|(_, _, entity)| entity.kind() == EntityKind::Contact)
            .map(|(_, _, entity)| entity)
            .collect();
        if contacts.is_empty() {
            return Ok(());
        }

        if let Some(token) = self.store.token(user_id, Provider::Mailchimp.as_str())? {
            if let Some(audience_id) = settings.mailchimp_audience_id.as_deref() {
                for entity in &contacts {
                    self.marketing_push(
                        user_id,
                        Provider::Mailchimp,
                        &self.adapters.mailchimp,
                        &token,
                        entity,
                        audience_id,
                        "sync_mailchimp_contact",
                        report,
                    )
                    .await?;
                }
            }
        }
        if let Some(token) = self
            .store
            .token(user_id, Provider::ConstantContact.as_str())?
        {
            if let Some(list_id) = settings.constant_contact_list_id.as_deref() {
                for entity in &contacts {
                    self.marketing_push(
                        user_id,
                        Provider::ConstantContact,
                        &self.adapters.constant_contact,
                        &token,
                        entity,
                        list_id,
                        "sync_constant_contact_contact",
                        report,
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn marketing_push(
        &self,
        user_id: &str,
        provider: Provider,
        adapter: &dyn ProviderAdapter,
        token: &str,
        entity: &EntityRecord,
        list_id: &str,
        action: &str,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        match adapter.push(token, entity, list_id).await {
            Ok(()) => {
                self.store.log_activity(
                    user_id,
                    action,
                    &json!({ "entity_id": entity_ref(entity), "group_id": list_id }).to_string(),
                )?;
                report.marketing_pushes += 1;
            }
            Err(error) => {
                tracing::warn!(
                    user_id,
                    provider = provider.as_str(),
                    label = %entity.label(),
                    error = %error,
                    "marketing push failed; continuing"
                );
                report.marketing_failures.push(ProviderFailure {
                    provider: provider.as_str().to_string(),
                    detail: error.to_string(),
                });
            }
        }
        Ok(())
    }

    fn log_contact_health(&self, user_id: &str, entity: &EntityRecord) -> Result<(), SyncError> {
        if entity.kind() != EntityKind::Contact {
            return Ok(());
        }
        let email = entity.contact_email().unwrap_or_default();
        let phone = entity.contact_phone().unwrap_or_default();
        if email.is_empty() && phone.is_empty() {
            return Ok(());
        }
        let email_score = health::score_email(email);
        let phone_score = health::score_phone(phone);
        self.store
            .log_health(user_id, &entity_ref(entity), email_score, phone_score)?;
        Ok(())
    }

    fn log_crm_push(
        &self,
        user_id: &str,
        entity: &EntityRecord,
        group_id: &str,
    ) -> Result<(), SyncError> {
        let action = format!("sync_realnex_{}", entity.kind().as_str());
        self.store.log_activity(
            user_id,
            &action,
            &json!({ "entity_id": entity_ref(entity), "group_id": group_id }).to_string(),
        )?;
        Ok(())
    }
}

fn enrichment_list_id(settings: &SettingsRecord, provider: Provider) -> Option<&str> {
    match provider {
        Provider::Apollo => settings.apollo_list_id.as_deref(),
        Provider::Seamless => settings.seamless_list_id.as_deref(),
        Provider::ZoomInfo => settings.zoominfo_list_id.as_deref(),
        _ => None,
    }
}

/// Stable reference for audit rows: source id, then email, then label.
fn entity_ref(entity: &EntityRecord) -> String {
    entity
        .source_id()
        .map(str::to_string)
        .or_else(|| entity.contact_email().map(str::to_string))
        .unwrap_or_else(|| entity.label())
}

/// Enrichment contacts become local contacts after import, so later passes
/// treat them as local data.
fn local_contact_record(user_id: &str, entity: &EntityRecord) -> ContactRecord {
    ContactRecord {
        id: entity_ref(entity),
        user_id: user_id.to_string(),
        name: entity.label(),
        email: entity.contact_email().map(str::to_string),
        phone: entity.contact_phone().map(str::to_string),
    }
}
