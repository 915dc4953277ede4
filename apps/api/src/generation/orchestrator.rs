//! Generation Orchestrator — drives the per-item, per-language fan-out.
//!
//! Flow: validate & resolve the task list → create a draft version →
//! for each language, for each item: render prompt → provider call →
//! store artifact (or record the failure) → stream a progress event →
//! finalize → emit `complete`.
//!
//! A single item failure never aborts a run; the run always ends in a
//! `complete` event (even at 0% success) unless a structural error aborted
//! the stream first. Promotion to active is a separate, explicit caller
//! action — never done here.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::{store, versions};
use crate::catalog::ChecklistCatalog;
use crate::errors::AppError;
use crate::generation::events::ProgressEvent;
use crate::generation::prompts::{render_prompt, PromptSpec, TaskItem};
use crate::generation::run::GenerationRun;
use crate::models::family::CacheFamily;
use crate::providers::{ProviderConfig, TextGenerator};

/// Request body for POST /api/v1/cache/generate.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub family: CacheFamily,
    #[serde(default)]
    pub source_version_id: Option<String>,
    pub languages: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub provider: ProviderConfig,
    pub prompts: PromptSpec,
}

/// A validated run: inputs checked, task list resolved. Producing a plan has
/// no side effects, so structural problems surface before any write.
#[derive(Debug)]
pub struct GenerationPlan {
    pub family: CacheFamily,
    pub source_version_id: Option<String>,
    pub languages: Vec<String>,
    pub description: String,
    pub provider_kind: String,
    pub prompts: PromptSpec,
    pub items: Vec<TaskItem>,
}

/// Resolves the task list for a request.
///
/// Base families fan out over the full checklist catalog. Summary families
/// fan out over the items already present in the source version for the one
/// requested language — the summary's language axis is exactly the source
/// artifact's language.
pub async fn plan(
    pool: &SqlitePool,
    catalog: &ChecklistCatalog,
    request: &GenerationRequest,
) -> Result<GenerationPlan, AppError> {
    if request.languages.is_empty() {
        return Err(AppError::Validation(
            "languages must contain at least one language".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for language in &request.languages {
        if language.trim().is_empty() {
            return Err(AppError::Validation("languages must be non-empty".to_string()));
        }
        if !seen.insert(language.as_str()) {
            return Err(AppError::Validation(format!(
                "language '{language}' is requested twice"
            )));
        }
    }

    let items = if let Some(source_family) = request.family.source_family() {
        let source_id = request.source_version_id.as_deref().ok_or_else(|| {
            AppError::Validation(format!(
                "family {} requires sourceVersionId",
                request.family
            ))
        })?;
        if request.languages.len() != 1 {
            return Err(AppError::Validation(
                "summary runs take exactly one language".to_string(),
            ));
        }
        let language = &request.languages[0];

        let source = versions::get(pool, source_id).await?;
        if source.family != source_family {
            return Err(AppError::Validation(format!(
                "Version {source_id} belongs to family {}, but {} summarizes {}",
                source.family, request.family, source_family
            )));
        }

        let artifacts = store::list(pool, source_id, language).await?;
        if artifacts.is_empty() {
            return Err(AppError::Validation(format!(
                "Version {source_id} has no '{language}' artifacts to summarize"
            )));
        }
        artifacts
            .into_iter()
            .map(|a| TaskItem {
                item_id: a.item_id,
                category: a.category,
                title: a.title,
                source_body: Some(a.body),
            })
            .collect()
    } else {
        if request.source_version_id.is_some() {
            return Err(AppError::Validation(
                "sourceVersionId only applies to summary families".to_string(),
            ));
        }
        catalog
            .items()
            .iter()
            .map(|i| TaskItem {
                item_id: i.item_id.clone(),
                category: i.category.clone(),
                title: i.title.clone(),
                source_body: None,
            })
            .collect()
    };

    Ok(GenerationPlan {
        family: request.family,
        source_version_id: request.source_version_id.clone(),
        languages: request.languages.clone(),
        description: request.description.clone(),
        provider_kind: request.provider.kind().to_string(),
        prompts: request.prompts.clone(),
        items,
    })
}

/// Runs the plan to completion, streaming progress into `tx`.
///
/// Structural failures (draft creation, store writes, finalize) end the
/// stream with a fatal `error` event. Per-item provider failures are
/// recorded into the run's error list and never abort the run. A dropped
/// subscriber cancels the run: no new tasks are issued, the in-flight call
/// was already allowed to finish, and the draft is left un-finalized with
/// whatever artifacts it got.
pub async fn run_generation(
    pool: &SqlitePool,
    generator: &dyn TextGenerator,
    plan: &GenerationPlan,
    delay: Duration,
    tx: &mpsc::Sender<ProgressEvent>,
) {
    if let Err(err) = execute(pool, generator, plan, delay, tx).await {
        warn!("Generation run aborted: {err}");
        let _ = tx
            .send(ProgressEvent::Error {
                message: err.to_string(),
            })
            .await;
    }
}

async fn execute(
    pool: &SqlitePool,
    generator: &dyn TextGenerator,
    plan: &GenerationPlan,
    delay: Duration,
    tx: &mpsc::Sender<ProgressEvent>,
) -> Result<(), AppError> {
    let total_items = plan.items.len();
    let total_tasks = total_items * plan.languages.len();
    let mut run = GenerationRun::new(total_items, total_tasks);

    let start = ProgressEvent::Start {
        total_items: run.total_items,
        total_tasks: run.total_tasks,
    };
    if !emit(tx, start).await {
        // Subscriber gone before the run started; nothing written
        return Ok(());
    }

    let draft = versions::create_draft(
        pool,
        plan.family,
        &plan.description,
        plan.source_version_id.as_deref(),
        &plan.provider_kind,
    )
    .await?;

    info!(
        "Generation run started: version={} languages={:?} tasks={total_tasks}",
        draft.version_id, plan.languages
    );

    for language in &plan.languages {
        for (index, item) in plan.items.iter().enumerate() {
            let announced = ProgressEvent::Progress {
                phase: language.clone(),
                current: index + 1,
                total: total_items,
                item_id: item.item_id.clone(),
                item_title: item.title.clone(),
                completed_tasks: run.attempted,
                total_tasks,
            };
            if !emit(tx, announced).await {
                return Ok(());
            }

            let prompt = render_prompt(&plan.prompts.template, item);
            let outcome = match generator.invoke(&prompt, &plan.prompts.system).await {
                Ok(body) => {
                    store::put(
                        pool,
                        &draft.version_id,
                        &item.item_id,
                        language,
                        &item.category,
                        &item.title,
                        &body,
                    )
                    .await?;
                    run.record_success();
                    ProgressEvent::ItemComplete {
                        item_id: item.item_id.clone(),
                        completed_tasks: run.attempted,
                        total_tasks,
                        percent: run.percent(),
                    }
                }
                Err(err) => {
                    warn!(
                        "Task failed: item={} language={language}: {err}",
                        item.item_id
                    );
                    run.record_failure(&item.item_id, language, err.to_string());
                    ProgressEvent::ItemError {
                        item_id: item.item_id.clone(),
                        error: err.to_string(),
                    }
                }
            };
            if !emit(tx, outcome).await {
                return Ok(());
            }

            // Fixed inter-call delay to respect provider throughput limits
            if run.attempted < total_tasks && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    let item_count = store::distinct_item_count(pool, &draft.version_id).await?;
    versions::finalize(pool, &draft.version_id, item_count).await?;

    info!(
        "Generation run complete: version={} items={item_count} success={} errors={}",
        draft.version_id,
        run.succeeded,
        run.errors.len()
    );

    emit(
        tx,
        ProgressEvent::Complete {
            version_id: draft.version_id,
            total_items: item_count,
            success_count: run.succeeded,
            error_count: run.errors.len(),
            errors: run.errors,
        },
    )
    .await;
    Ok(())
}

/// False when the subscriber has gone away — the run's cancellation signal.
async fn emit(tx: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) -> bool {
    tx.send(event).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::catalog::ChecklistItem;
    use crate::db::test_pool;
    use crate::providers::ProviderError;

    struct OkGenerator;

    #[async_trait]
    impl TextGenerator for OkGenerator {
        async fn invoke(&self, prompt: &str, _system: &str) -> Result<String, ProviderError> {
            Ok(format!("generated: {prompt}"))
        }
    }

    /// Fails every task whose rendered prompt mentions the marker item id.
    struct FailFor(&'static str);

    #[async_trait]
    impl TextGenerator for FailFor {
        async fn invoke(&self, prompt: &str, _system: &str) -> Result<String, ProviderError> {
            if prompt.contains(self.0) {
                return Err(ProviderError::Api {
                    status: 500,
                    message: "upstream blew up".to_string(),
                });
            }
            Ok("fine".to_string())
        }
    }

    fn catalog() -> ChecklistCatalog {
        ChecklistCatalog::new(vec![
            ChecklistItem {
                item_id: "1.1.1".to_string(),
                category: "management".to_string(),
                title: "Security policy".to_string(),
            },
            ChecklistItem {
                item_id: "1.2.1".to_string(),
                category: "management".to_string(),
                title: "Policy review".to_string(),
            },
            ChecklistItem {
                item_id: "2.1.1".to_string(),
                category: "protection".to_string(),
                title: "Encryption at rest".to_string(),
            },
        ])
    }

    fn request(value: serde_json::Value) -> GenerationRequest {
        serde_json::from_value(value).unwrap()
    }

    fn advice_request(languages: &[&str]) -> GenerationRequest {
        request(serde_json::json!({
            "family": "advice",
            "languages": languages,
            "description": "test run",
            "provider": {"kind": "claude", "apiKey": "k", "model": "claude-3-haiku"},
            "prompts": {"system": "You advise auditors.", "template": "Advise on [{itemId}] {title}"}
        }))
    }

    async fn run_to_events(
        pool: &SqlitePool,
        generator: &dyn TextGenerator,
        plan: &GenerationPlan,
    ) -> Vec<ProgressEvent> {
        let (tx, mut rx) = mpsc::channel(256);
        run_generation(pool, generator, plan, Duration::ZERO, &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn completed_version(events: &[ProgressEvent]) -> String {
        match events.last().expect("no events") {
            ProgressEvent::Complete { version_id, .. } => version_id.clone(),
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_success_run_streams_pairs_and_finalizes() {
        let pool = test_pool().await;
        let req = advice_request(&["ko", "en"]);
        let plan = plan(&pool, &catalog(), &req).await.unwrap();
        let events = run_to_events(&pool, &OkGenerator, &plan).await;

        // start + (progress + item-complete) per task + complete
        assert_eq!(events.len(), 1 + 6 * 2 + 1);
        assert!(matches!(
            events[0],
            ProgressEvent::Start { total_items: 3, total_tasks: 6 }
        ));

        // Language outer loop: the first three tasks are all "ko"
        for i in 0..6 {
            match &events[1 + i * 2] {
                ProgressEvent::Progress { phase, current, .. } => {
                    assert_eq!(phase, if i < 3 { "ko" } else { "en" });
                    assert_eq!(*current, i % 3 + 1);
                }
                other => panic!("expected progress at {i}, got {other:?}"),
            }
            assert!(matches!(events[2 + i * 2], ProgressEvent::ItemComplete { .. }));
        }

        match events.last().unwrap() {
            ProgressEvent::Complete {
                total_items,
                success_count,
                error_count,
                errors,
                ..
            } => {
                assert_eq!(*total_items, 3);
                assert_eq!(*success_count, 6);
                assert_eq!(*error_count, 0);
                assert!(errors.is_empty());
            }
            other => panic!("expected complete, got {other:?}"),
        }

        let version_id = completed_version(&events);
        assert!(version_id.starts_with("advice-"));
        assert!(version_id.contains("-claude-"));

        let ko = store::list(&pool, &version_id, "ko").await.unwrap();
        assert_eq!(ko.len(), 3);
        let version = versions::get(&pool, &version_id).await.unwrap();
        assert!(version.finalized);
        assert_eq!(version.item_count, 3);
    }

    #[tokio::test]
    async fn item_failure_is_recorded_but_never_aborts_the_run() {
        let pool = test_pool().await;
        let req = advice_request(&["ko"]);
        let mut plan = plan(&pool, &catalog(), &req).await.unwrap();
        // Scope to two items so the shape is easy to assert
        plan.items.truncate(2);

        let events = run_to_events(&pool, &FailFor("1.2.1"), &plan).await;
        let version_id = completed_version(&events);

        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::ItemError { item_id, .. } if item_id == "1.2.1")));

        match events.last().unwrap() {
            ProgressEvent::Complete {
                total_items,
                success_count,
                error_count,
                errors,
                ..
            } => {
                assert_eq!(*total_items, 1);
                assert_eq!(*success_count, 1);
                assert_eq!(*error_count, 1);
                assert_eq!(errors[0].item_id, "1.2.1");
                assert_eq!(errors[0].language, "ko");
            }
            other => panic!("expected complete, got {other:?}"),
        }

        assert!(store::get(&pool, &version_id, "1.1.1", "ko").await.is_ok());
        let err = store::get(&pool, &version_id, "1.2.1", "ko").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(versions::get(&pool, &version_id).await.unwrap().item_count, 1);
    }

    #[tokio::test]
    async fn run_completes_even_at_zero_success() {
        let pool = test_pool().await;
        let req = advice_request(&["ko"]);
        let plan = plan(&pool, &catalog(), &req).await.unwrap();

        // Every rendered prompt starts with "Advise", so every task fails
        let events = run_to_events(&pool, &FailFor("Advise"), &plan).await;
        let version_id = completed_version(&events);

        match events.last().unwrap() {
            ProgressEvent::Complete {
                total_items,
                success_count,
                error_count,
                ..
            } => {
                assert_eq!(*total_items, 0);
                assert_eq!(*success_count, 0);
                assert_eq!(*error_count, 3);
            }
            other => panic!("expected complete, got {other:?}"),
        }

        // An empty but finalized version, observable and re-runnable
        let version = versions::get(&pool, &version_id).await.unwrap();
        assert!(version.finalized);
        assert_eq!(version.item_count, 0);
    }

    #[tokio::test]
    async fn summary_run_fans_out_over_source_artifacts_only() {
        let pool = test_pool().await;

        // Seed a finalized advice version with three Korean artifacts
        let source = versions::create_draft(&pool, CacheFamily::Advice, "", None, "claude")
            .await
            .unwrap();
        for (item_id, title) in [("1.1.1", "Security policy"), ("1.2.1", "Policy review"), ("2.1.1", "Encryption at rest")] {
            store::put(&pool, &source.version_id, item_id, "ko", "management", title, "긴 안내문")
                .await
                .unwrap();
        }
        versions::finalize(&pool, &source.version_id, 3).await.unwrap();

        let req = request(serde_json::json!({
            "family": "adviceSummary",
            "sourceVersionId": source.version_id,
            "languages": ["ko"],
            "provider": {"kind": "claude", "apiKey": "k", "model": "claude-3-haiku"},
            "prompts": {"system": "Summarize.", "template": "Summarize [{itemId}]: {sourceBody}"}
        }));
        let plan = plan(&pool, &catalog(), &req).await.unwrap();
        assert_eq!(plan.items.len(), 3);
        assert!(plan.items.iter().all(|i| i.source_body.is_some()));

        let events = run_to_events(&pool, &OkGenerator, &plan).await;
        assert!(matches!(
            events[0],
            ProgressEvent::Start { total_items: 3, total_tasks: 3 }
        ));

        let version_id = completed_version(&events);
        let version = versions::get(&pool, &version_id).await.unwrap();
        assert_eq!(version.family, CacheFamily::AdviceSummary);
        assert_eq!(version.source_version_id.as_deref(), Some(source.version_id.as_str()));

        // The summary prompt carried the source artifact body
        let artifact = store::get(&pool, &version_id, "1.1.1", "ko").await.unwrap();
        assert!(artifact.body.contains("긴 안내문"));
    }

    #[tokio::test]
    async fn cancelled_subscriber_stops_the_run_before_any_write() {
        let pool = test_pool().await;
        let req = advice_request(&["ko"]);
        let plan = plan(&pool, &catalog(), &req).await.unwrap();

        let (tx, rx) = mpsc::channel(256);
        drop(rx);
        run_generation(&pool, &OkGenerator, &plan, Duration::ZERO, &tx).await;

        assert!(versions::list(&pool, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn plan_rejects_empty_and_duplicate_languages() {
        let pool = test_pool().await;
        let mut req = advice_request(&[]);
        let err = plan(&pool, &catalog(), &req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        req.languages = vec!["ko".to_string(), "ko".to_string()];
        let err = plan(&pool, &catalog(), &req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn plan_rejects_source_version_on_base_families() {
        let pool = test_pool().await;
        let mut req = advice_request(&["ko"]);
        req.source_version_id = Some("advice-whatever".to_string());
        let err = plan(&pool, &catalog(), &req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn plan_enforces_summary_rules() {
        let pool = test_pool().await;

        // Missing sourceVersionId
        let req = request(serde_json::json!({
            "family": "adviceSummary",
            "languages": ["ko"],
            "provider": {"kind": "claude", "apiKey": "k", "model": "m"},
            "prompts": {"system": "s", "template": "t"}
        }));
        assert!(matches!(
            plan(&pool, &catalog(), &req).await.unwrap_err(),
            AppError::Validation(_)
        ));

        // Unknown source version
        let req = request(serde_json::json!({
            "family": "adviceSummary",
            "sourceVersionId": "advice-missing",
            "languages": ["ko"],
            "provider": {"kind": "claude", "apiKey": "k", "model": "m"},
            "prompts": {"system": "s", "template": "t"}
        }));
        assert!(matches!(
            plan(&pool, &catalog(), &req).await.unwrap_err(),
            AppError::NotFound(_)
        ));

        // Source of the wrong family
        let evidence = versions::create_draft(&pool, CacheFamily::VirtualEvidence, "", None, "claude")
            .await
            .unwrap();
        store::put(&pool, &evidence.version_id, "1.1.1", "ko", "management", "Policy", "b")
            .await
            .unwrap();
        let req = request(serde_json::json!({
            "family": "adviceSummary",
            "sourceVersionId": evidence.version_id,
            "languages": ["ko"],
            "provider": {"kind": "claude", "apiKey": "k", "model": "m"},
            "prompts": {"system": "s", "template": "t"}
        }));
        assert!(matches!(
            plan(&pool, &catalog(), &req).await.unwrap_err(),
            AppError::Validation(_)
        ));

        // Two languages on a summary run
        let advice = versions::create_draft(&pool, CacheFamily::Advice, "", None, "claude")
            .await
            .unwrap();
        store::put(&pool, &advice.version_id, "1.1.1", "ko", "management", "Policy", "b")
            .await
            .unwrap();
        let req = request(serde_json::json!({
            "family": "adviceSummary",
            "sourceVersionId": advice.version_id,
            "languages": ["ko", "en"],
            "provider": {"kind": "claude", "apiKey": "k", "model": "m"},
            "prompts": {"system": "s", "template": "t"}
        }));
        assert!(matches!(
            plan(&pool, &catalog(), &req).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }
}
