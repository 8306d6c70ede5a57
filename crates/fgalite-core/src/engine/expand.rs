use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::model::{AuthorizationModel, RewriteRule};
use crate::tuple::{ObjectRef, SnapshotToken, SubjectRef, TupleFilter};

use super::{CheckError, TupleReader, resolve_relation};

pub struct ExpandRequest {
    pub object: ObjectRef,
    pub relation: String,
    pub snapshot: Option<SnapshotToken>,
}

/// One level of the userset tree rooted at `object#relation`. Computed and
/// tuple-to-userset leaves name the usersets a caller can expand next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandTree {
    pub name: String,
    pub root: ExpandNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandNode {
    /// Users named by tuples on the relation, usersets included.
    Users(Vec<SubjectRef>),
    /// `object#relation` of another relation on the same object.
    Computed(String),
    /// `target#relation` for every object the tupleset points at.
    TupleToUserset {
        tupleset: String,
        computed: Vec<String>,
    },
    Union(Vec<ExpandNode>),
    Intersection(Vec<ExpandNode>),
    Difference {
        base: Box<ExpandNode>,
        subtract: Box<ExpandNode>,
    },
}

type NodeFuture<'a> = Pin<Box<dyn Future<Output = Result<ExpandNode, CheckError>> + Send + 'a>>;

pub struct ExpandEngine<T: TupleReader> {
    reader: Arc<T>,
    model: Arc<AuthorizationModel>,
}

impl<T: TupleReader> ExpandEngine<T> {
    pub fn new(reader: Arc<T>, model: Arc<AuthorizationModel>) -> Self {
        Self { reader, model }
    }

    pub async fn expand(&self, request: &ExpandRequest) -> Result<ExpandTree, CheckError> {
        let relation_def =
            resolve_relation(&self.model, &request.object.object_type, &request.relation)?;

        let root = self
            .expand_rule(
                &relation_def.rewrite,
                &request.relation,
                &request.object,
                request.snapshot,
            )
            .await?;

        Ok(ExpandTree {
            name: format!("{}#{}", request.object, request.relation),
            root,
        })
    }

    fn expand_rule<'a>(
        &'a self,
        rule: &'a RewriteRule,
        relation: &'a str,
        object: &'a ObjectRef,
        snapshot: Option<SnapshotToken>,
    ) -> NodeFuture<'a> {
        Box::pin(async move {
            match rule {
                RewriteRule::Direct => {
                    let filter = TupleFilter::for_relation(object, relation);
                    let tuples = self.reader.read_tuples(&filter, snapshot).await?;
                    Ok(ExpandNode::Users(
                        tuples.into_iter().map(|t| t.subject).collect(),
                    ))
                }
                RewriteRule::ComputedUserset(computed) => {
                    Ok(ExpandNode::Computed(format!("{object}#{computed}")))
                }
                RewriteRule::TupleToUserset {
                    tupleset,
                    computed_relation,
                } => {
                    let filter = TupleFilter::for_relation(object, tupleset);
                    let tuples = self.reader.read_tuples(&filter, snapshot).await?;
                    let computed = tuples
                        .into_iter()
                        .filter(|t| !t.subject.is_userset())
                        .filter(|t| {
                            self.model
                                .get_relation(&t.subject.subject_type, computed_relation)
                                .is_some()
                        })
                        .map(|t| format!("{}#{computed_relation}", t.subject))
                        .collect();
                    Ok(ExpandNode::TupleToUserset {
                        tupleset: format!("{object}#{tupleset}"),
                        computed,
                    })
                }
                RewriteRule::Union(children) => {
                    let mut nodes = Vec::with_capacity(children.len());
                    for child in children {
                        nodes.push(self.expand_rule(child, relation, object, snapshot).await?);
                    }
                    Ok(ExpandNode::Union(nodes))
                }
                RewriteRule::Intersection(children) => {
                    let mut nodes = Vec::with_capacity(children.len());
                    for child in children {
                        nodes.push(self.expand_rule(child, relation, object, snapshot).await?);
                    }
                    Ok(ExpandNode::Intersection(nodes))
                }
                RewriteRule::Exclusion(base, subtract) => {
                    let base = self.expand_rule(base, relation, object, snapshot).await?;
                    let subtract = self
                        .expand_rule(subtract, relation, object, snapshot)
                        .await?;
                    Ok(ExpandNode::Difference {
                        base: Box::new(base),
                        subtract: Box::new(subtract),
                    })
                }
            }
        })
    }
}
