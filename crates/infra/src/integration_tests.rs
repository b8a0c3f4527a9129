//! End-to-end tests for the job lifecycle against the in-memory stores.
//!
//! Tests: SchemaManager → JobState → JobStore, with the default and a
//! permissive delegated authorizer.
//!
//! Verifies:
//! - Transitions only apply from their required source stage
//! - Progress is clamped on read, never on write
//! - Sharing and listing follow the default ACL policy
//! - Concurrent first starts of the schema gate converge on one record

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    use jobstate_auth::{Authorizer, AuthzError, ExternalAuthorization};
    use jobstate_core::{
        AuthorizationStrategy, Job, JobMetadata, JobResults, JobStage, ProgressSpec, ProgressType,
    };

    use crate::jobs::{
        CompleteJob, CreateAndStartJob, InMemoryJobStore, JobFacets, JobState, JobStateError,
        ListJobs, StartJob, UpdateJob,
    };
    use crate::schema::{InMemorySchemaStore, SchemaError, SchemaManager, SchemaRecord};

    type Engine = JobState<Arc<InMemoryJobStore>>;

    /// Permits every delegated check.
    struct AllowAll;

    #[async_trait]
    impl ExternalAuthorization for AllowAll {
        fn name(&self) -> &str {
            "allow-all"
        }

        async fn authorize_create(
            &self,
            _strategy: &AuthorizationStrategy,
            _auth_param: &str,
        ) -> Result<(), AuthzError> {
            Ok(())
        }

        async fn authorize_read(&self, _user: &str, _job: &Job) -> Result<(), AuthzError> {
            Ok(())
        }

        async fn authorize_read_params(
            &self,
            _strategy: &AuthorizationStrategy,
            _user: &str,
            _auth_params: &[String],
        ) -> Result<(), AuthzError> {
            Ok(())
        }

        async fn authorize_cancel(&self, _user: &str, _job: &Job) -> Result<(), AuthzError> {
            Ok(())
        }

        async fn authorize_delete(&self, _user: &str, _job: &Job) -> Result<(), AuthzError> {
            Ok(())
        }
    }

    async fn engine() -> Engine {
        let schema = SchemaManager::new(InMemorySchemaStore::new()).await.unwrap();
        JobState::new(InMemoryJobStore::arc(), &schema).await.unwrap()
    }

    async fn create(engine: &Engine, user: &str) -> String {
        engine
            .create_job(
                user,
                &Authorizer::default(),
                &AuthorizationStrategy::DEFAULT,
                "DEFAULT",
                &JobMetadata::empty(),
            )
            .await
            .unwrap()
            .to_string()
    }

    fn start(user: &str, job_id: &str, service: &str, progress: ProgressSpec) -> StartJob {
        StartJob {
            user: user.to_string(),
            job_id: job_id.to_string(),
            service: service.to_string(),
            status: Some("starting".to_string()),
            description: Some("a test job".to_string()),
            progress,
            est_complete: None,
        }
    }

    fn update(user: &str, job_id: &str, service: &str, delta: Option<u32>) -> UpdateJob {
        UpdateJob {
            user: user.to_string(),
            job_id: job_id.to_string(),
            service: service.to_string(),
            status: Some("working".to_string()),
            progress: delta,
            est_complete: None,
        }
    }

    fn complete(user: &str, job_id: &str, service: &str, error: Option<&str>) -> CompleteJob {
        CompleteJob {
            user: user.to_string(),
            job_id: job_id.to_string(),
            service: service.to_string(),
            status: Some("done".to_string()),
            error: error.map(str::to_string),
            results: None,
        }
    }

    async fn get(engine: &Engine, user: &str, job_id: &str) -> Result<Job, JobStateError> {
        engine.get_job(user, job_id, &Authorizer::default()).await
    }

    async fn list(engine: &Engine, query: ListJobs) -> Vec<String> {
        engine
            .list_jobs(&query, &Authorizer::default())
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id().to_string())
            .collect()
    }

    #[tokio::test]
    async fn task_job_lifecycle() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        assert_eq!(get(&engine, "alice", &id).await.unwrap().stage(), JobStage::Created);

        engine
            .start_job(start("alice", &id, "svc1", ProgressSpec::Task { max: 10 }))
            .await
            .unwrap();
        let job = get(&engine, "alice", &id).await.unwrap();
        assert_eq!(job.stage(), JobStage::Started);
        assert_eq!(job.progress_type(), Some(ProgressType::Task));
        assert_eq!((job.progress(), job.max_progress()), (Some(0), Some(10)));

        engine
            .update_job(update("alice", &id, "svc1", Some(12)))
            .await
            .unwrap();
        let job = get(&engine, "alice", &id).await.unwrap();
        assert_eq!((job.progress(), job.max_progress()), (Some(10), Some(10)));
        assert_eq!(job.record().progress, Some(12));

        engine
            .complete_job(complete("alice", &id, "svc1", None))
            .await
            .unwrap();
        let job = get(&engine, "alice", &id).await.unwrap();
        assert_eq!(job.stage(), JobStage::Complete);
        assert_eq!((job.progress(), job.max_progress()), (Some(10), Some(10)));

        let err = engine
            .cancel_job("alice", &id, None, &Authorizer::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            JobStateError::NoSuchJob(format!(
                "There is no job {id} that may be canceled by user alice"
            ))
        );
    }

    #[tokio::test]
    async fn starting_twice_changes_nothing() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &id, "svc1", ProgressSpec::None))
            .await
            .unwrap();
        let before = get(&engine, "alice", &id).await.unwrap();

        let err = engine
            .start_job(start("alice", &id, "svc2", ProgressSpec::Percent))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            JobStateError::NoSuchJob(format!("There is no unstarted job {id} for user alice"))
        );
        assert_eq!(get(&engine, "alice", &id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn only_the_owner_may_start() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        let err = engine
            .start_job(start("bob", &id, "svc1", ProgressSpec::None))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            JobStateError::NoSuchJob(format!("There is no unstarted job {id} for user bob"))
        );
    }

    #[tokio::test]
    async fn percent_progress_is_clamped_at_one_hundred() {
        let engine = engine().await;
        let id = engine
            .create_and_start_job(CreateAndStartJob {
                user: "alice".into(),
                service: "svc1".into(),
                status: None,
                description: None,
                progress: ProgressSpec::Percent,
                est_complete: Some(Utc::now() + Duration::hours(1)),
            })
            .await
            .unwrap()
            .to_string();

        for _ in 0..3 {
            engine
                .update_job(update("alice", &id, "svc1", Some(40)))
                .await
                .unwrap();
        }
        let job = get(&engine, "alice", &id).await.unwrap();
        assert_eq!((job.progress(), job.max_progress()), (Some(100), Some(100)));
    }

    #[tokio::test]
    async fn jobs_without_progress_report_none() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &id, "svc1", ProgressSpec::None))
            .await
            .unwrap();
        engine
            .update_job(update("alice", &id, "svc1", Some(3)))
            .await
            .unwrap();
        let job = get(&engine, "alice", &id).await.unwrap();
        assert_eq!((job.progress(), job.max_progress()), (None, None));
    }

    #[tokio::test]
    async fn updates_require_the_starting_service_and_an_open_job() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        let not_started = engine
            .update_job(update("alice", &id, "svc1", None))
            .await
            .unwrap_err();
        assert_eq!(
            not_started,
            JobStateError::NoSuchJob(format!(
                "There is no uncompleted job {id} for user alice started by service svc1"
            ))
        );

        engine
            .start_job(start("alice", &id, "svc1", ProgressSpec::None))
            .await
            .unwrap();
        assert!(matches!(
            engine.update_job(update("alice", &id, "other", None)).await,
            Err(JobStateError::NoSuchJob(_))
        ));

        engine
            .complete_job(complete("alice", &id, "svc1", None))
            .await
            .unwrap();
        assert!(matches!(
            engine.complete_job(complete("alice", &id, "svc1", None)).await,
            Err(JobStateError::NoSuchJob(_))
        ));
    }

    #[tokio::test]
    async fn error_completion_records_detail_and_results() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &id, "svc1", ProgressSpec::Task { max: 4 }))
            .await
            .unwrap();

        let results = JobResults {
            shock_url: Some("https://shock.example.org".into()),
            ..JobResults::default()
        };
        engine
            .complete_job(CompleteJob {
                results: Some(results.clone()),
                ..complete("alice", &id, "svc1", Some("out of memory"))
            })
            .await
            .unwrap();

        let job = get(&engine, "alice", &id).await.unwrap();
        assert_eq!(job.stage(), JobStage::Error);
        assert!(job.has_error());
        assert_eq!(job.error_message(), Some("out of memory"));
        assert_eq!(job.results(), Some(&results));
        assert_eq!(job.progress(), Some(4));
    }

    #[tokio::test]
    async fn concurrent_updates_each_apply_once() {
        let engine = Arc::new(engine().await);
        let id = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &id, "svc1", ProgressSpec::Task { max: 50 }))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = engine.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                engine.update_job(update("alice", &id, "svc1", Some(1))).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(get(&engine, "alice", &id).await.unwrap().progress(), Some(20));
    }

    #[tokio::test]
    async fn boundary_validation() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;

        assert_eq!(
            get(&engine, "alice", "nope").await.unwrap_err(),
            JobStateError::InvalidInput("Job ID nope is not a legal ID".into())
        );
        assert_eq!(
            engine
                .start_job(start("alice", &id, "svc1", ProgressSpec::Task { max: 0 }))
                .await
                .unwrap_err(),
            JobStateError::InvalidInput("The maximum progress for the job must be > 0".into())
        );
        assert_eq!(
            engine
                .start_job(StartJob {
                    est_complete: Some(Utc::now() - Duration::minutes(1)),
                    ..start("alice", &id, "svc1", ProgressSpec::None)
                })
                .await
                .unwrap_err(),
            JobStateError::InvalidInput("The estimated completion date must be in the future".into())
        );
        assert_eq!(
            engine
                .start_job(StartJob {
                    status: Some("s".repeat(201)),
                    ..start("alice", &id, "svc1", ProgressSpec::None)
                })
                .await
                .unwrap_err(),
            JobStateError::InvalidInput("status exceeds the maximum length of 200".into())
        );
        assert_eq!(
            engine
                .start_job(start("alice", &id, "", ProgressSpec::None))
                .await
                .unwrap_err(),
            JobStateError::InvalidInput("service cannot be null or the empty string".into())
        );
        // Nothing above touched the job.
        assert_eq!(get(&engine, "alice", &id).await.unwrap().stage(), JobStage::Created);
    }

    #[tokio::test]
    async fn metadata_is_kept_as_a_map() {
        let engine = engine().await;
        let meta = JobMetadata::new(
            [("foo".to_string(), "bar".to_string()), ("baz".to_string(), "qux".to_string())]
                .into_iter()
                .collect(),
        )
        .unwrap();
        let id = engine
            .create_job(
                "alice",
                &Authorizer::default(),
                &AuthorizationStrategy::DEFAULT,
                "DEFAULT",
                &meta,
            )
            .await
            .unwrap()
            .to_string();
        assert_eq!(get(&engine, "alice", &id).await.unwrap().metadata(), meta);
    }

    #[tokio::test]
    async fn sharing_has_set_semantics() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;

        engine
            .share_job("alice", &id, &["alice".into(), "bob".into(), "bob".into()])
            .await
            .unwrap();
        engine.share_job("alice", &id, &["bob".into()]).await.unwrap();

        let job = get(&engine, "bob", &id).await.unwrap();
        assert_eq!(job.shared(), &["bob".to_string()]);
        assert_eq!(job.owner(), "alice");

        let err = engine.share_job("bob", &id, &["carol".into()]).await.unwrap_err();
        assert_eq!(
            err,
            JobStateError::NoSuchJob(format!(
                "There is no job {id} with default authorization owned by user bob"
            ))
        );
    }

    #[tokio::test]
    async fn shared_users_may_only_unshare_themselves() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        engine
            .share_job("alice", &id, &["bob".into(), "carol".into()])
            .await
            .unwrap();

        let err = engine.unshare_job("bob", &id, &["carol".into()]).await.unwrap_err();
        assert_eq!(
            err,
            JobStateError::Unauthorized(format!(
                "User bob may only stop sharing job {id} for themselves"
            ))
        );

        engine.unshare_job("bob", &id, &["bob".into()]).await.unwrap();
        assert!(matches!(
            get(&engine, "bob", &id).await,
            Err(JobStateError::NoSuchJob(_))
        ));

        // Owners may remove anyone; strangers see nothing.
        engine.unshare_job("alice", &id, &["carol".into()]).await.unwrap();
        assert_eq!(
            engine.unshare_job("carol", &id, &["carol".into()]).await.unwrap_err(),
            JobStateError::NoSuchJob(format!(
                "There is no job {id} with default authorization visible to user carol"
            ))
        );
    }

    #[tokio::test]
    async fn default_policy_hides_jobs_from_strangers() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;

        assert_eq!(
            get(&engine, "bob", &id).await.unwrap_err(),
            JobStateError::NoSuchJob(format!("There is no job {id} viewable by user bob"))
        );
        assert_eq!(
            engine
                .cancel_job("bob", &id, None, &Authorizer::default())
                .await
                .unwrap_err(),
            JobStateError::NoSuchJob(format!(
                "There is no job {id} that may be canceled by user bob"
            ))
        );

        // Sharing grants read only.
        engine.share_job("alice", &id, &["bob".into()]).await.unwrap();
        get(&engine, "bob", &id).await.unwrap();
        assert!(matches!(
            engine.cancel_job("bob", &id, None, &Authorizer::default()).await,
            Err(JobStateError::NoSuchJob(_))
        ));
    }

    #[tokio::test]
    async fn cancel_marks_job_canceled() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &id, "svc1", ProgressSpec::None))
            .await
            .unwrap();

        engine
            .cancel_job("alice", &id, Some("user gave up"), &Authorizer::default())
            .await
            .unwrap();
        let job = get(&engine, "alice", &id).await.unwrap();
        assert_eq!(job.stage(), JobStage::Canceled);
        assert_eq!(job.canceled_by(), Some("alice"));
        assert_eq!(job.status(), Some("user gave up"));
        assert!(!job.has_error());

        // The service can no longer report on it.
        assert!(matches!(
            engine.update_job(update("alice", &id, "svc1", Some(1))).await,
            Err(JobStateError::NoSuchJob(_))
        ));
    }

    #[tokio::test]
    async fn unstarted_jobs_can_be_canceled() {
        let engine = engine().await;
        let id = create(&engine, "alice").await;
        engine
            .cancel_job("alice", &id, None, &Authorizer::default())
            .await
            .unwrap();
        assert_eq!(get(&engine, "alice", &id).await.unwrap().stage(), JobStage::Canceled);
    }

    #[tokio::test]
    async fn delete_requires_completion_or_the_service() {
        let engine = engine().await;
        let authz = Authorizer::default();
        let id = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &id, "svc1", ProgressSpec::None))
            .await
            .unwrap();

        assert_eq!(
            engine.delete_job("alice", &id, None, &authz).await.unwrap_err(),
            JobStateError::NoSuchJob(format!("There is no deletable job {id} for user alice"))
        );
        assert_eq!(
            engine
                .delete_job("alice", &id, Some("svc2"), &authz)
                .await
                .unwrap_err(),
            JobStateError::NoSuchJob(format!(
                "There is no deletable job {id} for user alice and service svc2"
            ))
        );

        engine
            .complete_job(complete("alice", &id, "svc1", None))
            .await
            .unwrap();
        assert!(matches!(
            engine.delete_job("bob", &id, None, &authz).await,
            Err(JobStateError::NoSuchJob(_))
        ));
        engine.delete_job("alice", &id, None, &authz).await.unwrap();

        assert!(matches!(
            get(&engine, "alice", &id).await,
            Err(JobStateError::NoSuchJob(_))
        ));
        assert!(list(&engine, ListJobs::for_user("alice")).await.is_empty());

        // A service may delete a running job it reports on.
        let other = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &other, "svc1", ProgressSpec::None))
            .await
            .unwrap();
        engine
            .delete_job("alice", &other, Some("svc1"), &authz)
            .await
            .unwrap();
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn listing_follows_facets() {
        let engine = engine().await;

        let created = create(&engine, "alice").await;
        let running = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &running, "svc1", ProgressSpec::None))
            .await
            .unwrap();
        let done = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &done, "svc2", ProgressSpec::None))
            .await
            .unwrap();
        engine
            .complete_job(complete("alice", &done, "svc2", None))
            .await
            .unwrap();
        let failed = create(&engine, "alice").await;
        engine
            .start_job(start("alice", &failed, "svc1", ProgressSpec::None))
            .await
            .unwrap();
        engine
            .complete_job(complete("alice", &failed, "svc1", Some("boom")))
            .await
            .unwrap();
        let canceled = create(&engine, "alice").await;
        engine
            .cancel_job("alice", &canceled, None, &Authorizer::default())
            .await
            .unwrap();
        let shared = create(&engine, "bob").await;
        engine.share_job("bob", &shared, &["alice".into()]).await.unwrap();
        let _private = create(&engine, "bob").await;

        let all = list(&engine, ListJobs::for_user("alice")).await;
        assert_eq!(
            all,
            vec![
                created.clone(),
                running.clone(),
                done.clone(),
                failed.clone(),
                canceled.clone(),
                shared.clone()
            ]
        );

        let only = |facets: JobFacets| ListJobs::for_user("alice").facets(facets);
        assert_eq!(
            list(&engine, only(JobFacets { canceled: true, ..JobFacets::default() })).await,
            vec![canceled.clone()]
        );
        assert_eq!(
            list(&engine, only(JobFacets { running: true, ..JobFacets::default() })).await,
            vec![running.clone()]
        );
        assert_eq!(
            list(&engine, only(JobFacets { complete: true, error: true, ..JobFacets::default() }))
                .await,
            vec![done.clone(), failed.clone()]
        );
        assert_eq!(
            list(&engine, only(JobFacets { shared: true, ..JobFacets::default() })).await,
            all
        );
        assert_eq!(
            list(&engine, ListJobs::for_user("alice").services(["svc1"])).await,
            vec![running, failed]
        );
        assert!(list(&engine, ListJobs::for_user("carol")).await.is_empty());

        let services = engine.list_services("alice").await.unwrap();
        assert_eq!(
            services.into_iter().collect::<Vec<_>>(),
            vec!["svc1".to_string(), "svc2".to_string()]
        );
    }

    #[tokio::test]
    async fn delegated_strategies() {
        let engine = engine().await;
        let strategy = AuthorizationStrategy::new("custom").unwrap();

        // Without hooks the strategy is unsupported.
        assert!(matches!(
            engine
                .create_job("alice", &Authorizer::default(), &strategy, "42", &JobMetadata::empty())
                .await,
            Err(JobStateError::UnimplementedStrategy(_))
        ));

        let authz = Authorizer::new(AllowAll);
        let id = engine
            .create_job("alice", &authz, &strategy, "42", &JobMetadata::empty())
            .await
            .unwrap()
            .to_string();

        let err = engine.share_job("alice", &id, &["bob".into()]).await.unwrap_err();
        assert!(matches!(err, JobStateError::NonDefaultStrategy(_)));
        assert!(matches!(
            engine.unshare_job("alice", &id, &["bob".into()]).await,
            Err(JobStateError::NonDefaultStrategy(_))
        ));

        // The hook decides reads, not the ACL.
        let job = engine.get_job("bob", &id, &authz).await.unwrap();
        assert!(job.shared().is_empty());

        // Without hooks even the owner gets the unsupported-strategy error,
        // not a missing job.
        let unsupported =
            JobStateError::UnimplementedStrategy("Authorization strategy custom is not supported".into());
        let none = Authorizer::default();
        assert_eq!(engine.get_job("alice", &id, &none).await.unwrap_err(), unsupported);
        assert_eq!(engine.get_job("bob", &id, &none).await.unwrap_err(), unsupported);
        assert_eq!(
            engine.cancel_job("alice", &id, None, &none).await.unwrap_err(),
            unsupported
        );

        let finished = engine
            .create_job("alice", &authz, &strategy, "42", &JobMetadata::empty())
            .await
            .unwrap()
            .to_string();
        engine
            .start_job(start("alice", &finished, "svc1", ProgressSpec::None))
            .await
            .unwrap();
        engine
            .complete_job(complete("alice", &finished, "svc1", None))
            .await
            .unwrap();
        assert_eq!(
            engine.delete_job("alice", &finished, None, &none).await.unwrap_err(),
            unsupported
        );
        engine.delete_job("alice", &finished, None, &authz).await.unwrap();

        let listed = engine
            .list_jobs(
                &ListJobs::for_user("bob").strategy(strategy.clone(), ["42", "43"]),
                &authz,
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].auth_param(), "42");

        // Default-strategy listing never includes delegated jobs of others.
        assert!(list(&engine, ListJobs::for_user("bob")).await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_first_starts_record_one_schema_version() {
        let store = Arc::new(InMemorySchemaStore::new());
        let a = SchemaManager::from_arc(store.clone()).await.unwrap();
        let b = SchemaManager::from_arc(store.clone()).await.unwrap();

        let (ra, rb) = tokio::join!(
            a.check_and_upgrade("jobstate", 2),
            b.check_and_upgrade("jobstate", 2)
        );
        ra.unwrap();
        rb.unwrap();
        assert_eq!(store.records(), vec![SchemaRecord::new("jobstate", 2, false)]);

        // Parallel tasks racing on one store converge the same way.
        let store = Arc::new(InMemorySchemaStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let manager = SchemaManager::from_arc(store).await?;
                manager.check_and_upgrade("jobstate", 2).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.records(), vec![SchemaRecord::new("jobstate", 2, false)]);
    }

    #[tokio::test]
    async fn engine_refuses_a_newer_database() {
        let schema = SchemaManager::new(InMemorySchemaStore::with_records(vec![
            SchemaRecord::new("jobstate", 3, false),
        ]))
        .await
        .unwrap();
        let err = JobState::new(InMemoryJobStore::arc(), &schema).await.unwrap_err();
        assert_eq!(
            err,
            JobStateError::Schema(SchemaError::Incompatible {
                codebase: 2,
                database: 3
            })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn surfaced_progress_is_min_of_sum_and_max(
            max in 1u32..200,
            deltas in proptest::collection::vec(0u32..50, 0..12),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (progress, max_progress) = rt.block_on(async {
                let engine = engine().await;
                let id = create(&engine, "alice").await;
                engine
                    .start_job(start("alice", &id, "svc1", ProgressSpec::Task { max }))
                    .await
                    .unwrap();
                for d in &deltas {
                    engine
                        .update_job(update("alice", &id, "svc1", Some(*d)))
                        .await
                        .unwrap();
                }
                let job = get(&engine, "alice", &id).await.unwrap();
                (job.progress(), job.max_progress())
            });

            let sum: u64 = deltas.iter().map(|d| u64::from(*d)).sum();
            prop_assert_eq!(max_progress, Some(u64::from(max)));
            prop_assert_eq!(progress, Some(sum.min(u64::from(max))));
        }
    }
}
