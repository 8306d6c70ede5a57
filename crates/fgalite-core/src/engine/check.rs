use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::model::{AuthorizationModel, RewriteRule};
use crate::tuple::{ObjectRef, SnapshotToken, SubjectRef, TupleFilter};

use super::{CheckError, EngineConfig, TupleReader, resolve_relation};

pub struct CheckRequest {
    pub object: ObjectRef,
    pub relation: String,
    pub user: SubjectRef,
    pub snapshot: Option<SnapshotToken>,
}

/// Why a check could not be decided. The check still answers `false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckDiagnostic {
    #[error("cycle detected while resolving {object}#{relation}")]
    CycleDetected { object: String, relation: String },

    #[error("resolution depth exceeded the limit of {max_depth}")]
    DepthExceeded { max_depth: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub allowed: bool,
    pub diagnostic: Option<CheckDiagnostic>,
}

#[derive(Debug)]
enum Outcome {
    Allowed,
    Denied,
    Indeterminate(CheckDiagnostic),
}

struct CheckContext<'a> {
    user: &'a SubjectRef,
    snapshot: Option<SnapshotToken>,
}

/// Relations entered on the way down to the current node. Each branch owns its
/// copy, so siblings never see each other's visits.
#[derive(Debug, Clone, Default)]
struct ResolutionPath {
    depth: usize,
    visited: HashSet<(String, String, String)>,
}

type OutcomeFuture<'a> = Pin<Box<dyn Future<Output = Result<Outcome, CheckError>> + Send + 'a>>;

pub struct CheckEngine<T: TupleReader> {
    reader: Arc<T>,
    model: Arc<AuthorizationModel>,
    config: EngineConfig,
}

impl<T: TupleReader> CheckEngine<T> {
    pub fn new(reader: Arc<T>, model: Arc<AuthorizationModel>, config: EngineConfig) -> Self {
        Self {
            reader,
            model,
            config,
        }
    }

    pub async fn check(&self, request: &CheckRequest) -> Result<CheckResult, CheckError> {
        resolve_relation(&self.model, &request.object.object_type, &request.relation)?;

        let ctx = CheckContext {
            user: &request.user,
            snapshot: request.snapshot,
        };
        let outcome = self
            .resolve(
                &request.relation,
                &request.object,
                &ctx,
                &ResolutionPath::default(),
            )
            .await?;

        Ok(match outcome {
            Outcome::Allowed => CheckResult {
                allowed: true,
                diagnostic: None,
            },
            Outcome::Denied => CheckResult {
                allowed: false,
                diagnostic: None,
            },
            Outcome::Indeterminate(diagnostic) => CheckResult {
                allowed: false,
                diagnostic: Some(diagnostic),
            },
        })
    }

    fn resolve<'a>(
        &'a self,
        relation: &'a str,
        object: &'a ObjectRef,
        ctx: &'a CheckContext<'a>,
        path: &'a ResolutionPath,
    ) -> OutcomeFuture<'a> {
        Box::pin(async move {
            let key = (
                object.object_type.clone(),
                object.object_id.clone(),
                relation.to_string(),
            );
            if path.visited.contains(&key) {
                tracing::debug!(%object, relation, user = %ctx.user, "cycle detected during check");
                return Ok(Outcome::Indeterminate(CheckDiagnostic::CycleDetected {
                    object: object.to_string(),
                    relation: relation.to_string(),
                }));
            }
            if path.depth >= self.config.max_depth {
                tracing::debug!(%object, relation, depth = path.depth, "check depth limit reached");
                return Ok(Outcome::Indeterminate(CheckDiagnostic::DepthExceeded {
                    max_depth: self.config.max_depth,
                }));
            }

            let relation_def = resolve_relation(&self.model, &object.object_type, relation)?;

            let mut next = path.clone();
            next.depth += 1;
            next.visited.insert(key);

            self.evaluate_rule(&relation_def.rewrite, relation, object, ctx, &next)
                .await
        })
    }

    fn evaluate_rule<'a>(
        &'a self,
        rule: &'a RewriteRule,
        relation: &'a str,
        object: &'a ObjectRef,
        ctx: &'a CheckContext<'a>,
        path: &'a ResolutionPath,
    ) -> OutcomeFuture<'a> {
        Box::pin(async move {
            match rule {
                RewriteRule::Direct => self.evaluate_direct(relation, object, ctx, path).await,
                RewriteRule::ComputedUserset(computed) => {
                    self.resolve(computed, object, ctx, path).await
                }
                RewriteRule::Union(children) => {
                    let mut pending = None;
                    for child in children {
                        match self
                            .evaluate_rule(child, relation, object, ctx, path)
                            .await?
                        {
                            Outcome::Allowed => return Ok(Outcome::Allowed),
                            Outcome::Denied => {}
                            Outcome::Indeterminate(d) => {
                                pending.get_or_insert(d);
                            }
                        }
                    }
                    Ok(pending.map_or(Outcome::Denied, Outcome::Indeterminate))
                }
                RewriteRule::Intersection(children) => {
                    if children.is_empty() {
                        return Ok(Outcome::Denied);
                    }
                    let mut pending = None;
                    for child in children {
                        match self
                            .evaluate_rule(child, relation, object, ctx, path)
                            .await?
                        {
                            Outcome::Denied => return Ok(Outcome::Denied),
                            Outcome::Allowed => {}
                            Outcome::Indeterminate(d) => {
                                pending.get_or_insert(d);
                            }
                        }
                    }
                    Ok(pending.map_or(Outcome::Allowed, Outcome::Indeterminate))
                }
                RewriteRule::Exclusion(base, subtract) => {
                    match self.evaluate_rule(base, relation, object, ctx, path).await? {
                        Outcome::Allowed => {}
                        other => return Ok(other),
                    }
                    Ok(
                        match self
                            .evaluate_rule(subtract, relation, object, ctx, path)
                            .await?
                        {
                            Outcome::Allowed => Outcome::Denied,
                            Outcome::Denied => Outcome::Allowed,
                            indeterminate @ Outcome::Indeterminate(_) => indeterminate,
                        },
                    )
                }
                RewriteRule::TupleToUserset {
                    tupleset,
                    computed_relation,
                } => {
                    self.evaluate_tuple_to_userset(tupleset, computed_relation, object, ctx, path)
                        .await
                }
            }
        })
    }

    async fn evaluate_direct(
        &self,
        relation: &str,
        object: &ObjectRef,
        ctx: &CheckContext<'_>,
        path: &ResolutionPath,
    ) -> Result<Outcome, CheckError> {
        let filter = TupleFilter::for_relation(object, relation);
        let tuples = self.reader.read_tuples(&filter, ctx.snapshot).await?;

        if tuples.iter().any(|t| &t.subject == ctx.user) {
            return Ok(Outcome::Allowed);
        }

        let mut pending = None;
        for tuple in &tuples {
            let Some(ref userset_relation) = tuple.subject.subject_relation else {
                continue;
            };
            let target = tuple.subject.as_object();
            if self
                .model
                .get_relation(&target.object_type, userset_relation)
                .is_none()
            {
                tracing::debug!(%tuple, "skipping userset not defined in the model");
                continue;
            }
            match self.resolve(userset_relation, &target, ctx, path).await? {
                Outcome::Allowed => return Ok(Outcome::Allowed),
                Outcome::Denied => {}
                Outcome::Indeterminate(d) => {
                    pending.get_or_insert(d);
                }
            }
        }

        Ok(pending.map_or(Outcome::Denied, Outcome::Indeterminate))
    }

    async fn evaluate_tuple_to_userset(
        &self,
        tupleset: &str,
        computed_relation: &str,
        object: &ObjectRef,
        ctx: &CheckContext<'_>,
        path: &ResolutionPath,
    ) -> Result<Outcome, CheckError> {
        let filter = TupleFilter::for_relation(object, tupleset);
        let tuples = self.reader.read_tuples(&filter, ctx.snapshot).await?;

        let mut pending = None;
        for tuple in &tuples {
            if tuple.subject.is_userset() {
                continue;
            }
            let target = tuple.subject.as_object();
            if self
                .model
                .get_relation(&target.object_type, computed_relation)
                .is_none()
            {
                continue;
            }
            match self.resolve(computed_relation, &target, ctx, path).await? {
                Outcome::Allowed => return Ok(Outcome::Allowed),
                Outcome::Denied => {}
                Outcome::Indeterminate(d) => {
                    pending.get_or_insert(d);
                }
            }
        }

        Ok(pending.map_or(Outcome::Denied, Outcome::Indeterminate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RelationDef, RelationReference, TypeDefinition, parse_model};
    use crate::tuple::Tuple;

    struct TestStore {
        tuples: Vec<Tuple>,
    }

    impl TupleReader for TestStore {
        async fn read_tuples(
            &self,
            filter: &TupleFilter,
            _snapshot: Option<SnapshotToken>,
        ) -> Result<Vec<Tuple>, CheckError> {
            Ok(self
                .tuples
                .iter()
                .filter(|t| filter.matches(t))
                .cloned()
                .collect())
        }
    }

    fn make_engine(model: AuthorizationModel, tuples: Vec<Tuple>) -> CheckEngine<TestStore> {
        CheckEngine::new(
            Arc::new(TestStore { tuples }),
            Arc::new(model),
            EngineConfig::default(),
        )
    }

    fn dsl(body: &str) -> AuthorizationModel {
        parse_model(&format!("model\n  schema 1.1\n{body}")).unwrap()
    }

    fn tuple(object: &str, relation: &str, user: &str) -> Tuple {
        Tuple::parse(user, relation, object).unwrap()
    }

    fn request(user: &str, relation: &str, object: &str) -> CheckRequest {
        CheckRequest {
            object: object.parse().unwrap(),
            relation: relation.to_string(),
            user: user.parse().unwrap(),
            snapshot: None,
        }
    }

    const DOCUMENTS: &str = "
type user
type group
  relations
    define member: [user, group#member]
type folder
  relations
    define viewer: [user]
type document
  relations
    define parent: [folder]
    define owner: [user]
    define editor: [user] or owner
    define viewer: [user, group#member] or editor or viewer from parent
    define banned: [user]
    define reviewer: [user]
    define approver: editor and reviewer
    define can_view: viewer but not banned
";

    fn documents() -> AuthorizationModel {
        dsl(DOCUMENTS)
    }

    async fn allowed(
        engine: &CheckEngine<TestStore>,
        user: &str,
        relation: &str,
        object: &str,
    ) -> bool {
        engine
            .check(&request(user, relation, object))
            .await
            .unwrap()
            .allowed
    }

    #[tokio::test]
    async fn check_rejects_unknown_type() {
        let engine = make_engine(documents(), vec![]);

        let err = engine
            .check(&request("user:alice", "viewer", "spreadsheet:q1"))
            .await
            .unwrap_err();

        assert!(
            matches!(err, CheckError::TypeNotFound(ref t) if t == "spreadsheet"),
            "expected TypeNotFound, got: {err}"
        );
    }

    #[tokio::test]
    async fn check_rejects_unknown_relation() {
        let engine = make_engine(documents(), vec![]);

        let err = engine
            .check(&request("user:alice", "commenter", "document:budget"))
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                CheckError::RelationNotFound { ref type_name, ref relation }
                    if type_name == "document" && relation == "commenter"
            ),
            "expected RelationNotFound, got: {err}"
        );
    }

    #[tokio::test]
    async fn direct_tuple_grants_and_absence_denies() {
        let engine = make_engine(
            documents(),
            vec![tuple("document:budget", "owner", "user:alice")],
        );

        assert!(allowed(&engine, "user:alice", "owner", "document:budget").await);
        assert!(!allowed(&engine, "user:bob", "owner", "document:budget").await);
        assert!(!allowed(&engine, "user:alice", "owner", "document:other").await);
    }

    #[tokio::test]
    async fn computed_userset_follows_other_relation() {
        let engine = make_engine(
            documents(),
            vec![tuple("document:budget", "owner", "user:alice")],
        );

        assert!(allowed(&engine, "user:alice", "editor", "document:budget").await);
        assert!(allowed(&engine, "user:alice", "viewer", "document:budget").await);
    }

    #[tokio::test]
    async fn userset_tuple_resolves_through_group_membership() {
        let engine = make_engine(
            documents(),
            vec![
                tuple("document:budget", "viewer", "group:eng#member"),
                tuple("group:eng", "member", "group:platform#member"),
                tuple("group:platform", "member", "user:carol"),
            ],
        );

        assert!(allowed(&engine, "user:carol", "viewer", "document:budget").await);
        assert!(!allowed(&engine, "user:dave", "viewer", "document:budget").await);
    }

    #[tokio::test]
    async fn userset_user_matches_exact_tuple() {
        let engine = make_engine(
            documents(),
            vec![tuple("document:budget", "viewer", "group:eng#member")],
        );

        assert!(allowed(&engine, "group:eng#member", "viewer", "document:budget").await);
    }

    #[tokio::test]
    async fn tuple_to_userset_inherits_from_parent() {
        let engine = make_engine(
            documents(),
            vec![
                tuple("document:budget", "parent", "folder:finance"),
                tuple("folder:finance", "viewer", "user:erin"),
            ],
        );

        assert!(allowed(&engine, "user:erin", "viewer", "document:budget").await);
    }

    #[tokio::test]
    async fn tuple_to_userset_skips_targets_without_relation() {
        let model = dsl("
type user
type team
type folder
  relations
    define viewer: [user]
type document
  relations
    define parent: [folder, team]
    define viewer: viewer from parent
");
        let engine = make_engine(
            model,
            vec![
                tuple("document:budget", "parent", "team:ops"),
                tuple("document:budget", "parent", "folder:finance"),
                tuple("folder:finance", "viewer", "user:erin"),
            ],
        );

        assert!(allowed(&engine, "user:erin", "viewer", "document:budget").await);
    }

    #[tokio::test]
    async fn intersection_requires_every_branch() {
        let engine = make_engine(
            documents(),
            vec![
                tuple("document:budget", "owner", "user:alice"),
                tuple("document:budget", "reviewer", "user:alice"),
                tuple("document:budget", "editor", "user:bob"),
            ],
        );

        assert!(allowed(&engine, "user:alice", "approver", "document:budget").await);
        assert!(!allowed(&engine, "user:bob", "approver", "document:budget").await);
    }

    #[tokio::test]
    async fn exclusion_removes_banned_users() {
        let engine = make_engine(
            documents(),
            vec![
                tuple("document:budget", "viewer", "user:alice"),
                tuple("document:budget", "viewer", "user:bob"),
                tuple("document:budget", "banned", "user:bob"),
            ],
        );

        assert!(allowed(&engine, "user:alice", "can_view", "document:budget").await);
        assert!(!allowed(&engine, "user:bob", "can_view", "document:budget").await);
    }

    #[tokio::test]
    async fn group_membership_cycle_terminates_with_diagnostic() {
        let engine = make_engine(
            documents(),
            vec![
                tuple("group:a", "member", "group:b#member"),
                tuple("group:b", "member", "group:a#member"),
            ],
        );

        let result = engine
            .check(&request("user:mallory", "member", "group:a"))
            .await
            .unwrap();

        assert!(!result.allowed);
        assert_eq!(
            result.diagnostic,
            Some(CheckDiagnostic::CycleDetected {
                object: "group:a".to_string(),
                relation: "member".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn cycle_does_not_hide_a_grant_on_another_branch() {
        let engine = make_engine(
            documents(),
            vec![
                tuple("group:a", "member", "group:b#member"),
                tuple("group:b", "member", "group:a#member"),
                tuple("group:b", "member", "user:frank"),
            ],
        );

        let result = engine
            .check(&request("user:frank", "member", "group:a"))
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.diagnostic, None);
    }

    #[tokio::test]
    async fn indeterminate_subtract_never_grants() {
        let model = dsl("
type user
type group
  relations
    define member: [user, group#member]
type document
  relations
    define viewer: [user]
    define blocked: [group#member]
    define can_view: viewer but not blocked
");
        let engine = make_engine(
            model,
            vec![
                tuple("document:budget", "viewer", "user:alice"),
                tuple("document:budget", "blocked", "group:a#member"),
                tuple("group:a", "member", "group:b#member"),
                tuple("group:b", "member", "group:a#member"),
            ],
        );

        let result = engine
            .check(&request("user:alice", "can_view", "document:budget"))
            .await
            .unwrap();

        assert!(!result.allowed);
        assert!(matches!(
            result.diagnostic,
            Some(CheckDiagnostic::CycleDetected { .. })
        ));
    }

    #[tokio::test]
    async fn deep_chain_hits_depth_limit() {
        let mut tuples = Vec::new();
        for i in 0..40 {
            tuples.push(tuple(
                &format!("group:g{i}"),
                "member",
                &format!("group:g{}#member", i + 1),
            ));
        }
        tuples.push(tuple("group:g40", "member", "user:zoe"));
        let engine = make_engine(documents(), tuples);

        let result = engine
            .check(&request("user:zoe", "member", "group:g0"))
            .await
            .unwrap();

        assert!(!result.allowed);
        assert_eq!(
            result.diagnostic,
            Some(CheckDiagnostic::DepthExceeded { max_depth: 25 })
        );
    }

    #[tokio::test]
    async fn chain_within_depth_limit_resolves() {
        let mut tuples = Vec::new();
        for i in 0..10 {
            tuples.push(tuple(
                &format!("group:g{i}"),
                "member",
                &format!("group:g{}#member", i + 1),
            ));
        }
        tuples.push(tuple("group:g10", "member", "user:zoe"));
        let engine = make_engine(documents(), tuples);

        assert!(allowed(&engine, "user:zoe", "member", "group:g0").await);
    }

    #[tokio::test]
    async fn stale_userset_tuple_is_ignored() {
        let model = AuthorizationModel::new(vec![
            TypeDefinition {
                name: "user".to_string(),
                relations: vec![],
            },
            TypeDefinition {
                name: "document".to_string(),
                relations: vec![RelationDef {
                    name: "viewer".to_string(),
                    rewrite: RewriteRule::Direct,
                    directly_related_user_types: vec![RelationReference::direct("user")],
                }],
            },
        ]);
        let engine = make_engine(
            model,
            vec![tuple("document:budget", "viewer", "team:ops#member")],
        );

        assert!(!allowed(&engine, "user:alice", "viewer", "document:budget").await);
    }
}
