use crate::node::{BundleContext, Node};
use crate::pipeline::{GraphSnapshot, NodeId, Pipeline};
use crate::type_token::Partition;
use crate::window::WindowedValue;
use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Clone, Copy, Debug)]
pub enum ExecMode {
    Sequential,
    Parallel {
        threads: Option<usize>,
        partitions: Option<usize>,
    },
}

pub struct Runner {
    pub mode: ExecMode,
    pub default_partitions: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            mode: ExecMode::Parallel {
                threads: None,
                partitions: None,
            },
            default_partitions: 2 * num_cpus::get().max(2),
        }
    }
}

impl Runner {
    /// Evaluate everything `terminal` depends on and return its elements.
    pub fn run_collect<T: 'static + Send + Sync + Clone>(
        &self,
        p: &Pipeline,
        terminal: NodeId,
    ) -> Result<Vec<WindowedValue<T>>> {
        let (parallel, partitions) = match self.mode {
            ExecMode::Sequential => (false, 1),
            ExecMode::Parallel {
                threads,
                partitions,
            } => {
                if let Some(t) = threads {
                    // ok() to ignore "already built" on repeated calls in tests
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(t)
                        .build_global()
                        .ok();
                }
                (true, partitions.unwrap_or(self.default_partitions).max(1))
            }
        };

        let mut exec = Exec::new(p.snapshot(), terminal, parallel, partitions)?;
        let parts = exec.input(terminal)?;

        let mut out = Vec::new();
        for part in parts {
            let v = *part
                .downcast::<Vec<WindowedValue<T>>>()
                .map_err(|_| anyhow!("terminal type mismatch"))?;
            out.extend(v);
        }
        Ok(out)
    }
}

/// One evaluation of the DAG reachable from a terminal node.
///
/// Node outputs are memoised. `pending` counts the reads each output still
/// has to serve; the last reader takes ownership, earlier ones get a clone.
struct Exec {
    graph: GraphSnapshot,
    parents: HashMap<NodeId, Vec<NodeId>>,
    parallel: bool,
    partitions: usize,
    memo: HashMap<NodeId, Vec<Partition>>,
    pending: HashMap<NodeId, usize>,
}

impl Exec {
    fn new(
        graph: GraphSnapshot,
        terminal: NodeId,
        parallel: bool,
        partitions: usize,
    ) -> Result<Self> {
        let mut parents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (from, to) in &graph.edges {
            parents.entry(*to).or_default().push(*from);
        }

        let mut pending: HashMap<NodeId, usize> = HashMap::new();
        pending.insert(terminal, 1);
        let mut seen = HashSet::new();
        let mut stack = vec![terminal];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if !graph.nodes.contains_key(&id) {
                return Err(anyhow!("missing node {id:?}"));
            }
            for parent in parents.get(&id).into_iter().flatten() {
                *pending.entry(*parent).or_insert(0) += 1;
                stack.push(*parent);
            }
        }

        Ok(Self {
            graph,
            parents,
            parallel,
            partitions,
            memo: HashMap::new(),
            pending,
        })
    }

    /// Output of `id` for one reader.
    fn input(&mut self, id: NodeId) -> Result<Vec<Partition>> {
        if !self.memo.contains_key(&id) {
            let out = self.eval(id)?;
            self.memo.insert(id, out);
        }
        let left = self.pending.entry(id).or_insert(1);
        *left = left.saturating_sub(1);
        if *left == 0 {
            return self
                .memo
                .remove(&id)
                .with_context(|| format!("node {id:?} output already consumed"));
        }

        let ops = self
            .graph
            .vec_ops
            .get(&id)
            .with_context(|| format!("no vec ops for node {id:?}"))?;
        let cached = self.memo.get(&id).map(Vec::as_slice).unwrap_or_default();
        cached
            .iter()
            .map(|p| {
                ops.clone_any(p.as_ref())
                    .ok_or_else(|| anyhow!("node {id:?}: cannot clone `{}` output", ops.elem_name()))
            })
            .collect()
    }

    fn single_parent(&self, id: NodeId) -> Result<NodeId> {
        self.parents
            .get(&id)
            .and_then(|ps| ps.first())
            .copied()
            .with_context(|| format!("node {id:?} has no input"))
    }

    fn eval(&mut self, id: NodeId) -> Result<Vec<Partition>> {
        let node = self
            .graph
            .nodes
            .get(&id)
            .cloned()
            .with_context(|| format!("missing node {id:?}"))?;

        match node {
            Node::Source { payload } => {
                let ops = self
                    .graph
                    .vec_ops
                    .get(&id)
                    .with_context(|| format!("no vec ops for node {id:?}"))?;
                ops.split(payload.as_ref(), self.partitions)
                    .ok_or_else(|| anyhow!("source payload is not Vec<{}>", ops.elem_name()))
            }
            Node::Stateless(ops) => {
                let input = self.input(self.single_parent(id)?)?;
                self.map_parts(input, |bundle, part| {
                    let mut cx = BundleContext::new(bundle);
                    ops.iter().try_fold(part, |acc, op| op.apply(acc, &mut cx))
                })
            }
            Node::Combine {
                local,
                merge,
                finish,
                fanout,
            } => {
                let input = self.input(self.single_parent(id)?)?;
                let mut level = self.map_parts(input, |_, part| local(part))?;
                let width = fanout.unwrap_or(usize::MAX).max(2);
                let mut round = 0usize;
                let last = loop {
                    if level.len() <= 1 {
                        break match level.pop() {
                            Some(p) => p,
                            None => merge(Vec::new())?,
                        };
                    }
                    let groups = chunk_owned(level, width);
                    level = if self.parallel {
                        groups
                            .into_par_iter()
                            .map(|g| merge(g))
                            .collect::<Result<Vec<_>>>()?
                    } else {
                        groups
                            .into_iter()
                            .map(|g| merge(g))
                            .collect::<Result<Vec<_>>>()?
                    };
                    round += 1;
                    debug!(node = id.raw(), round, partials = level.len(), "combine merge round");
                };
                Ok(vec![finish(last)?])
            }
            Node::Barrier(exec) => {
                let input = self.input(self.single_parent(id)?)?;
                Ok(vec![exec(input)?])
            }
            Node::Flatten => {
                let parents = self.parents.get(&id).cloned().unwrap_or_default();
                let mut out = Vec::new();
                for parent in parents {
                    out.extend(self.input(parent)?);
                }
                Ok(out)
            }
        }
    }

    fn map_parts<F>(&self, parts: Vec<Partition>, f: F) -> Result<Vec<Partition>>
    where
        F: Fn(usize, Partition) -> Result<Partition> + Send + Sync,
    {
        if self.parallel {
            parts
                .into_par_iter()
                .enumerate()
                .map(|(i, p)| f(i, p))
                .collect()
        } else {
            parts
                .into_iter()
                .enumerate()
                .map(|(i, p)| f(i, p))
                .collect()
        }
    }
}

/// Split `parts` into owned groups of at most `width`.
fn chunk_owned(parts: Vec<Partition>, width: usize) -> Vec<Vec<Partition>> {
    let mut groups = Vec::with_capacity(parts.len().div_ceil(width));
    let mut it = parts.into_iter().peekable();
    while it.peek().is_some() {
        groups.push(it.by_ref().take(width).collect());
    }
    groups
}
