//! Radial low-voltage feeder solved with the linearized DistFlow equations.
//!
//! For a line from node `i` to node `j` carrying the active/reactive power
//! `P`, `Q` of everything downstream of `j`:
//! ```text
//! v_j^2 = v_i^2 - 2 (r P + x Q) / V_nom^2        (v in p.u.)
//! ```
//! Line losses are neglected.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use rand::{SeedableRng, rngs::StdRng};
use tracing::debug;

use super::profile::{Profile, gaussian_noise};
use super::{GridModel, GridVoltages};
use crate::error::{ModelError, SimError};
use crate::sim::types::SimConfig;

/// One feeder segment between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeederLine {
    pub from: u32,
    pub to: u32,
    /// Series resistance (ohm).
    pub r_ohm: f64,
    /// Series reactance (ohm).
    pub x_ohm: f64,
}

impl FeederLine {
    /// A straight chain `1 - 2 - ... - nodes` with identical segments.
    pub fn chain(nodes: u32, r_ohm: f64, x_ohm: f64) -> Vec<Self> {
        (1..nodes)
            .map(|from| Self {
                from,
                to: from + 1,
                r_ohm,
                x_ohm,
            })
            .collect()
    }

    /// Reads a topology CSV with `FROM`, `TO`, `Raa`, `Xaa` columns.
    ///
    /// Other columns (e.g. `Imax`) are ignored.
    pub fn from_csv(path: &Path) -> Result<Vec<Self>, SimError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| SimError::data(path, format!("no column named \"{name}\"")))
        };
        let (from, to, r, x) = (column("FROM")?, column("TO")?, column("Raa")?, column("Xaa")?);

        let mut lines = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let field = |idx: usize| record.get(idx).unwrap_or_default();
            let bad = |what: &str| SimError::data(path, format!("row {}: invalid {what}", row + 1));
            lines.push(Self {
                from: field(from).parse().map_err(|_| bad("FROM"))?,
                to: field(to).parse().map_err(|_| bad("TO"))?,
                r_ohm: field(r).parse().map_err(|_| bad("Raa"))?,
                x_ohm: field(x).parse().map_err(|_| bad("Xaa"))?,
            });
        }
        Ok(lines)
    }
}

/// Daily consumption pattern of the passive consumers.
///
/// `base_w + amplitude_w * cos(2π (h - peak_hour) / 24) + noise`, floored at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadShape {
    pub base_w: f64,
    pub amplitude_w: f64,
    pub peak_hour: f64,
    pub noise_std_w: f64,
}

impl LoadShape {
    fn sample(&self, hour: f64, rng: &mut StdRng) -> f64 {
        let phase = 2.0 * std::f64::consts::PI * (hour - self.peak_hour) / 24.0;
        (self.base_w + self.amplitude_w * phase.cos() + gaussian_noise(rng, self.noise_std_w))
            .max(0.0)
    }
}

/// Electrical parameters of the feeder.
#[derive(Debug, Clone, PartialEq)]
pub struct FeederParams {
    /// Nominal line-to-line voltage (V).
    pub nominal_voltage_v: f64,
    /// Power factor of every load (lagging).
    pub power_factor: f64,
    /// Node held at 1.0 p.u.
    pub slack_node: u32,
    /// Node hosting the controllable load.
    pub smart_node: u32,
}

/// A radial feeder with one passive consumer per node and one controllable load.
#[derive(Debug, Clone)]
pub struct RadialFeeder {
    node_ids: Vec<u32>,
    /// Node indices ordered so every parent precedes its children.
    order: Vec<usize>,
    /// `(parent index, r_ohm, x_ohm)` of the line feeding each node.
    upstream: Vec<Option<(usize, f64, f64)>>,
    smart: usize,
    /// Passive load per node (the slack node's is unused).
    loads: Vec<Profile>,
    v_nom_sq: f64,
    tan_phi: f64,
}

impl RadialFeeder {
    /// Builds the feeder and draws every passive load over `config`'s horizon.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] if the lines do not form a tree rooted
    /// at the slack node, or the smart node is missing or equal to the slack.
    pub fn new(
        lines: &[FeederLine],
        params: &FeederParams,
        shape: &LoadShape,
        config: &SimConfig,
        seed: u64,
    ) -> Result<Self, ModelError> {
        if !(params.power_factor > 0.0 && params.power_factor <= 1.0) {
            return Err(ModelError::Invalid("power factor must be in (0, 1]".into()));
        }
        if params.nominal_voltage_v <= 0.0 {
            return Err(ModelError::Invalid("nominal voltage must be > 0".into()));
        }

        let mut index: BTreeMap<u32, usize> = BTreeMap::new();
        index.insert(params.slack_node, 0);
        for line in lines {
            for id in [line.from, line.to] {
                let next = index.len();
                index.entry(id).or_insert(next);
            }
        }
        let mut node_ids = vec![0; index.len()];
        for (&id, &i) in &index {
            node_ids[i] = id;
        }

        let smart = *index.get(&params.smart_node).ok_or_else(|| {
            ModelError::Invalid(format!("smart node {} is not in the topology", params.smart_node))
        })?;
        if smart == 0 {
            return Err(ModelError::Invalid("smart node cannot be the slack node".into()));
        }

        let mut adjacency: Vec<Vec<(usize, f64, f64)>> = vec![Vec::new(); node_ids.len()];
        for line in lines {
            let (a, b) = (index[&line.from], index[&line.to]);
            adjacency[a].push((b, line.r_ohm, line.x_ohm));
            adjacency[b].push((a, line.r_ohm, line.x_ohm));
        }

        let mut upstream: Vec<Option<(usize, f64, f64)>> = vec![None; node_ids.len()];
        let mut visited = vec![false; node_ids.len()];
        let mut order = Vec::with_capacity(node_ids.len());
        let mut queue = VecDeque::from([0usize]);
        visited[0] = true;
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &(next, r, x) in &adjacency[node] {
                if upstream[node].is_some_and(|(parent, _, _)| parent == next) {
                    continue;
                }
                if visited[next] {
                    return Err(ModelError::Invalid(format!(
                        "topology is not radial: loop through node {}",
                        node_ids[next]
                    )));
                }
                visited[next] = true;
                upstream[next] = Some((node, r, x));
                queue.push_back(next);
            }
        }
        if let Some(i) = visited.iter().position(|v| !v) {
            return Err(ModelError::Invalid(format!(
                "node {} is not connected to the slack node",
                node_ids[i]
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let loads = (0..node_ids.len())
            .map(|i| {
                if i == 0 {
                    return Profile::new(Vec::new());
                }
                let values = (0..config.total_steps())
                    .map(|t| {
                        let hour = (config.time_at(t) + config.delta_min / 2.0) / 60.0;
                        shape.sample(hour, &mut rng)
                    })
                    .collect();
                Profile::new(values)
            })
            .collect();

        Ok(Self {
            node_ids,
            order,
            upstream,
            smart,
            loads,
            v_nom_sq: params.nominal_voltage_v * params.nominal_voltage_v,
            tan_phi: params.power_factor.acos().tan(),
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Consumer key of node `id`.
    pub fn consumer_name(id: u32) -> String {
        format!("node_{id}")
    }

    /// Solves node voltages (p.u.) for per-node active consumption `loads_w`,
    /// indexed like the internal node order (slack first).
    fn solve(&self, loads_w: &[f64]) -> Result<Vec<f64>, ModelError> {
        let mut branch_p = loads_w.to_vec();
        for &node in self.order.iter().rev() {
            if let Some((parent, _, _)) = self.upstream[node] {
                branch_p[parent] += branch_p[node];
            }
        }

        let mut v_sq = vec![1.0; self.node_ids.len()];
        for &node in &self.order {
            if let Some((parent, r, x)) = self.upstream[node] {
                let p = branch_p[node];
                let q = p * self.tan_phi;
                v_sq[node] = v_sq[parent] - 2.0 * (r * p + x * q) / self.v_nom_sq;
                if v_sq[node] <= 0.0 {
                    return Err(ModelError::Invalid(format!(
                        "voltage collapse at node {}",
                        self.node_ids[node]
                    )));
                }
            }
        }
        Ok(v_sq.into_iter().map(f64::sqrt).collect())
    }
}

impl GridModel for RadialFeeder {
    fn voltages(&mut self, setpoint_w: f64, time_index: usize) -> Result<GridVoltages, ModelError> {
        let mut loads_w = vec![0.0; self.node_ids.len()];
        for (i, load) in loads_w.iter_mut().enumerate().skip(1) {
            *load = if i == self.smart {
                setpoint_w
            } else {
                self.loads[i].at(time_index)?
            };
        }

        let v = self.solve(&loads_w)?;
        let consumers = (1..self.node_ids.len())
            .filter(|&i| i != self.smart)
            .map(|i| (Self::consumer_name(self.node_ids[i]), v[i]))
            .collect();
        debug!(
            time_index,
            setpoint_w,
            smart_pu = v[self.smart],
            "grid power flow solved"
        );

        Ok(GridVoltages {
            consumers,
            smart_consumer: v[self.smart],
        })
    }
}
