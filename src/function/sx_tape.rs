//! Flat scalar tape for SX Functions.
//!
//! The tape stores opcodes rather than expression trees, so a Function body
//! can be re-evaluated over any [`Element`] without touching the `SxElem`
//! graph it was recorded from. Slot layout: every input nonzero first (in
//! input order), then constants and operations in dependency order. Outputs
//! are slot references, one per output nonzero.

use std::collections::{HashMap, HashSet};

use num_traits::Zero;

use crate::bvec::Bvec;
use crate::codegen::CodeGenerator;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::opcode::{self, OpCode, UNUSED};
use crate::sx::{SxElem, SxNode};

/// A recorded scalar computation with fixed inputs and outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct SxTape {
    pub(super) opcodes: Vec<OpCode>,
    pub(super) arg_indices: Vec<[u32; 2]>,
    /// Constant value for `Const` slots, zero elsewhere.
    pub(super) values: Vec<f64>,
    pub(super) num_inputs: u32,
    pub(super) output_indices: Vec<u32>,
}

impl SxTape {
    fn with_capacity(est_ops: usize) -> Self {
        SxTape {
            opcodes: Vec::with_capacity(est_ops),
            arg_indices: Vec::with_capacity(est_ops),
            values: Vec::with_capacity(est_ops),
            num_inputs: 0,
            output_indices: Vec::new(),
        }
    }

    #[inline]
    fn push(&mut self, op: OpCode, args: [u32; 2], value: f64) -> u32 {
        let idx = self.opcodes.len() as u32;
        self.opcodes.push(op);
        self.arg_indices.push(args);
        self.values.push(value);
        idx
    }

    /// Record the expressions `outputs` as functions of the symbols `inputs`.
    ///
    /// Every symbol reachable from `outputs` must appear in `inputs`;
    /// otherwise the names of the missing ones are reported.
    pub(crate) fn record(function: &str, inputs: &[SxElem], outputs: &[SxElem]) -> Result<SxTape> {
        let order = sx_topo_sort(outputs);
        let mut tape = SxTape::with_capacity(inputs.len() + order.len());
        let mut slot: HashMap<usize, u32> = HashMap::with_capacity(inputs.len() + order.len());

        for input in inputs {
            let idx = tape.push(OpCode::Input, [UNUSED, UNUSED], 0.0);
            slot.entry(input.key()).or_insert(idx);
        }
        tape.num_inputs = inputs.len() as u32;

        let mut free: Vec<String> = Vec::new();
        let mut free_seen: HashSet<usize> = HashSet::new();
        for e in &order {
            if slot.contains_key(&e.key()) {
                continue;
            }
            let idx = match e.node() {
                SxNode::Const(v) => tape.push(OpCode::Const, [UNUSED, UNUSED], *v),
                SxNode::Symbol { name, .. } => {
                    if free_seen.insert(e.key()) {
                        free.push(name.clone());
                    }
                    continue;
                }
                SxNode::Unary { op, arg } => match slot.get(&arg.key()) {
                    Some(&a) => tape.push(*op, [a, UNUSED], 0.0),
                    None => continue,
                },
                SxNode::Binary { op, lhs, rhs } => match (slot.get(&lhs.key()), slot.get(&rhs.key())) {
                    (Some(&a), Some(&b)) => tape.push(*op, [a, b], 0.0),
                    _ => continue,
                },
            };
            slot.insert(e.key(), idx);
        }
        if !free.is_empty() {
            return Err(Error::FreeVariables {
                function: function.to_string(),
                names: free,
            });
        }
        tape.output_indices = outputs
            .iter()
            .map(|o| slot.get(&o.key()).copied())
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| Error::InvalidState {
                detail: format!("'{}': output expression was not recorded", function),
            })?;
        tape.optimize();
        Ok(tape)
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_inputs as usize
    }

    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.output_indices.len()
    }

    /// Number of slots (inputs, constants and operations).
    #[inline]
    pub fn num_ops(&self) -> usize {
        self.opcodes.len()
    }

    pub fn output_indices(&self) -> &[u32] {
        &self.output_indices
    }

    /// Forward sweep over `w`, whose first `num_inputs` entries must already
    /// hold the input values. `w` needs [`num_ops`](Self::num_ops) entries.
    pub(crate) fn sweep<T: Element>(&self, w: &mut [T]) {
        for i in self.num_inputs as usize..self.opcodes.len() {
            w[i] = match self.opcodes[i] {
                OpCode::Input => continue,
                OpCode::Const => T::from_f64(self.values[i]),
                op => {
                    let [a, b] = self.arg_indices[i];
                    let a = w[a as usize].clone();
                    let b = if b != UNUSED { w[b as usize].clone() } else { T::zero() };
                    opcode::eval_forward(op, a, b)
                }
            };
        }
    }

    /// Dependency propagation: on return `w[i]` holds the union of the input
    /// marks slot `i` depends on.
    pub(crate) fn sp_sweep_forward(&self, w: &mut [Bvec]) {
        for i in self.num_inputs as usize..self.opcodes.len() {
            w[i] = match self.opcodes[i] {
                OpCode::Input => continue,
                OpCode::Const => 0,
                _ => {
                    let [a, b] = self.arg_indices[i];
                    let mut bits = w[a as usize];
                    if b != UNUSED {
                        bits |= w[b as usize];
                    }
                    bits
                }
            };
        }
    }

    /// Adjoint of [`sp_sweep_forward`](Self::sp_sweep_forward). `w` holds
    /// output marks on its output slots (zero elsewhere); on return the
    /// input slots hold the accumulated marks and every other slot is clear.
    pub(crate) fn sp_sweep_reverse(&self, w: &mut [Bvec]) {
        for i in (self.num_inputs as usize..self.opcodes.len()).rev() {
            let bits = w[i];
            w[i] = 0;
            if bits == 0 || matches!(self.opcodes[i], OpCode::Const | OpCode::Input) {
                continue;
            }
            let [a, b] = self.arg_indices[i];
            w[a as usize] |= bits;
            if b != UNUSED {
                w[b as usize] |= bits;
            }
        }
    }

    /// Symbolic forward mode: evaluate the tape on `inputs` and push every
    /// direction of `seeds` (each of length `num_inputs`) through it.
    ///
    /// Returns the output expressions and, per direction, the output tangents.
    pub(crate) fn forward_symbolic(
        &self,
        inputs: &[SxElem],
        seeds: &[Vec<SxElem>],
    ) -> (Vec<SxElem>, Vec<Vec<SxElem>>) {
        let n = self.opcodes.len();
        let mut v: Vec<SxElem> = vec![SxElem::zero(); n];
        v[..inputs.len()].clone_from_slice(inputs);
        self.sweep(&mut v);

        let mut tangents = Vec::with_capacity(seeds.len());
        let mut t: Vec<SxElem> = vec![SxElem::zero(); n];
        for seed in seeds {
            t[..seed.len()].clone_from_slice(seed);
            for i in self.num_inputs as usize..n {
                t[i] = match self.opcodes[i] {
                    OpCode::Input | OpCode::Const => SxElem::zero(),
                    op => {
                        let [a, b] = self.arg_indices[i];
                        let va = v[a as usize].clone();
                        let vb = if b != UNUSED { v[b as usize].clone() } else { SxElem::zero() };
                        let (da, db) = opcode::reverse_partials(op, va, vb, v[i].clone());
                        let mut ti = da * t[a as usize].clone();
                        if b != UNUSED {
                            ti = ti + db * t[b as usize].clone();
                        }
                        ti
                    }
                };
            }
            tangents.push(self.output_indices.iter().map(|&o| t[o as usize].clone()).collect());
        }
        let outputs = self.output_indices.iter().map(|&o| v[o as usize].clone()).collect();
        (outputs, tangents)
    }

    /// Symbolic reverse mode: evaluate the tape on `inputs` and pull every
    /// direction of `seeds` (each of length `num_outputs`) back to the inputs.
    pub(crate) fn reverse_symbolic(
        &self,
        inputs: &[SxElem],
        seeds: &[Vec<SxElem>],
    ) -> (Vec<SxElem>, Vec<Vec<SxElem>>) {
        let n = self.opcodes.len();
        let mut v: Vec<SxElem> = vec![SxElem::zero(); n];
        v[..inputs.len()].clone_from_slice(inputs);
        self.sweep(&mut v);

        let mut sens = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let mut adj: Vec<SxElem> = vec![SxElem::zero(); n];
            for (&o, s) in self.output_indices.iter().zip(seed) {
                adj[o as usize] = adj[o as usize].clone() + s.clone();
            }
            for i in (self.num_inputs as usize..n).rev() {
                let op = self.opcodes[i];
                if matches!(op, OpCode::Input | OpCode::Const) || adj[i].is_zero_constant() {
                    continue;
                }
                let bar = adj[i].clone();
                let [a, b] = self.arg_indices[i];
                let va = v[a as usize].clone();
                let vb = if b != UNUSED { v[b as usize].clone() } else { SxElem::zero() };
                let (da, db) = opcode::reverse_partials(op, va, vb, v[i].clone());
                adj[a as usize] = adj[a as usize].clone() + da * bar.clone();
                if b != UNUSED {
                    adj[b as usize] = adj[b as usize].clone() + db * bar;
                }
            }
            adj.truncate(self.num_inputs as usize);
            sens.push(adj);
        }
        let outputs = self.output_indices.iter().map(|&o| v[o as usize].clone()).collect();
        (outputs, sens)
    }

    /// Emit the tape as assignments to `w`. `inputs[k]` is the expression
    /// reading input slot `k`, `outputs[j]` the destination of output `j`
    /// (`None` to skip it).
    pub(crate) fn emit(&self, g: &mut CodeGenerator, inputs: &[String], outputs: &[Option<String>]) {
        let slot = |i: u32| format!("w[{}]", i);
        for (i, op) in self.opcodes.iter().enumerate() {
            let [a, b] = self.arg_indices[i];
            let expr = match op {
                OpCode::Input => inputs[i].clone(),
                OpCode::Const => CodeGenerator::constant(self.values[i]),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    format!("{} {} {}", slot(a), op.symbol(), slot(b))
                }
                OpCode::Neg => format!("-{}", slot(a)),
                OpCode::Recip => format!("1.0 / {}", slot(a)),
                OpCode::Sq => format!("{} * {}", slot(a), slot(a)),
                _ => format!("{}({})", op.symbol(), slot(a)),
            };
            g.assign(slot(i as u32), expr);
        }
        for (&o, dst) in self.output_indices.iter().zip(outputs) {
            if let Some(dst) = dst {
                g.assign(dst.clone(), slot(o));
            }
        }
    }

    /// Core DCE: reachability walk from `seeds`, compact tape, return index remap.
    fn dce_compact(&mut self, seeds: &[u32]) -> Vec<u32> {
        let n = self.opcodes.len();
        let mut reachable = vec![false; n];
        for flag in reachable.iter_mut().take(self.num_inputs as usize) {
            *flag = true;
        }

        let mut stack: Vec<u32> = seeds.to_vec();
        while let Some(idx) = stack.pop() {
            let i = idx as usize;
            if reachable[i] {
                continue;
            }
            reachable[i] = true;
            let [a, b] = self.arg_indices[i];
            if a != UNUSED {
                stack.push(a);
            }
            if b != UNUSED {
                stack.push(b);
            }
        }

        let mut remap = vec![0u32; n];
        let mut new_idx = 0u32;
        for i in 0..n {
            if reachable[i] {
                remap[i] = new_idx;
                new_idx += 1;
            }
        }
        let new_len = new_idx as usize;

        let mut write = 0;
        for (read, &is_reachable) in reachable.iter().enumerate() {
            if is_reachable {
                self.opcodes[write] = self.opcodes[read];
                self.values[write] = self.values[read];
                let [a, b] = self.arg_indices[read];
                self.arg_indices[write] = [
                    if a != UNUSED { remap[a as usize] } else { UNUSED },
                    if b != UNUSED { remap[b as usize] } else { UNUSED },
                ];
                write += 1;
            }
        }
        self.opcodes.truncate(new_len);
        self.arg_indices.truncate(new_len);
        self.values.truncate(new_len);
        remap
    }

    pub fn dead_code_elimination(&mut self) {
        let seeds = self.output_indices.clone();
        let remap = self.dce_compact(&seeds);
        for oi in &mut self.output_indices {
            *oi = remap[*oi as usize];
        }
    }

    /// Common subexpression elimination.
    ///
    /// Deduplicates identical `(OpCode, arg0, arg1)` triples, normalising
    /// argument order for commutative ops, and constants with identical bit
    /// patterns. Finishes with a DCE pass to remove the duplicates.
    pub fn cse(&mut self) {
        let n = self.opcodes.len();
        let mut seen: HashMap<(OpCode, u32, u32), u32> = HashMap::new();
        let mut seen_const: HashMap<u64, u32> = HashMap::new();
        let mut remap: Vec<u32> = (0..n as u32).collect();

        for i in 0..n {
            let op = self.opcodes[i];
            match op {
                OpCode::Input => continue,
                OpCode::Const => {
                    let canonical = *seen_const.entry(self.values[i].to_bits()).or_insert(i as u32);
                    remap[i] = canonical;
                    continue;
                }
                _ => {}
            }
            let [a, b] = self.arg_indices[i];
            let a = remap[a as usize];
            let b = if b != UNUSED { remap[b as usize] } else { UNUSED };
            self.arg_indices[i] = [a, b];

            let key = if b == UNUSED {
                (op, a, UNUSED)
            } else if op.is_commutative() {
                (op, a.min(b), a.max(b))
            } else {
                (op, a, b)
            };
            if let Some(&canonical) = seen.get(&key) {
                remap[i] = canonical;
            } else {
                seen.insert(key, i as u32);
            }
        }

        for oi in &mut self.output_indices {
            *oi = remap[*oi as usize];
        }
        self.dead_code_elimination();
    }

    /// CSE followed by DCE. In debug builds, validates the tape afterwards.
    pub fn optimize(&mut self) {
        self.cse();

        #[cfg(debug_assertions)]
        {
            let n = self.opcodes.len();
            for i in 0..n {
                let [a, b] = self.arg_indices[i];
                match self.opcodes[i] {
                    OpCode::Input | OpCode::Const => {
                        assert_eq!([a, b], [UNUSED, UNUSED], "leaf slot {} has arguments", i);
                    }
                    op => {
                        assert!((a as usize) < i, "arg0 {} not before op {}", a, i);
                        assert_eq!(b != UNUSED, op.is_binary(), "arity mismatch at op {}", i);
                        if b != UNUSED {
                            assert!((b as usize) < i, "arg1 {} not before op {}", b, i);
                        }
                    }
                }
            }
            for &oi in &self.output_indices {
                assert!((oi as usize) < n, "output slot {} out of bounds (tape len {})", oi, n);
            }
            let input_count = self.opcodes.iter().filter(|&&op| op == OpCode::Input).count();
            assert_eq!(input_count, self.num_inputs as usize, "num_inputs mismatch after optimization");
        }
    }
}

/// Every element reachable from `roots`, operands before users.
fn sx_topo_sort(roots: &[SxElem]) -> Vec<SxElem> {
    let mut order = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut stack: Vec<(SxElem, bool)> = Vec::new();
    for root in roots {
        if visited.contains(&root.key()) {
            continue;
        }
        stack.push((root.clone(), false));
        while let Some((e, expanded)) = stack.pop() {
            if expanded {
                order.push(e);
                continue;
            }
            if !visited.insert(e.key()) {
                continue;
            }
            let operands = e.operands();
            stack.push((e, true));
            for op in operands.into_iter().rev() {
                if !visited.contains(&op.key()) {
                    stack.push((op, false));
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn cse_merges_duplicate_subexpressions() {
        let x = SxElem::sym("x");
        let y = SxElem::sym("y");
        // Two structurally equal but distinct products.
        let p1 = x.clone() * y.clone();
        let p2 = y.clone() * x.clone();
        let tape = SxTape::record("f", &[x, y], &[p1 + p2]).unwrap();
        // x, y, x*y, (x*y)+(x*y)
        assert_eq!(tape.num_ops(), 4);
    }

    #[test]
    fn outputs_may_be_inputs() {
        let x = SxElem::sym("x");
        let y = SxElem::sym("y");
        let tape = SxTape::record("f", &[x, y.clone()], &[y]).unwrap();
        assert_eq!(tape.num_ops(), 2);
        assert_eq!(tape.output_indices(), &[1]);
    }

    #[test]
    fn sweep_matches_direct_evaluation() {
        let x = SxElem::sym("x");
        let y = SxElem::sym("y");
        let e = (x.clone() * y.clone()).sin() + x.clone() / y.clone();
        let tape = SxTape::record("f", &[x, y], &[e]).unwrap();
        let mut w = vec![0.0; tape.num_ops()];
        w[0] = 0.3;
        w[1] = 1.7;
        tape.sweep(&mut w);
        let got = w[tape.output_indices()[0] as usize];
        assert!((got - ((0.3f64 * 1.7).sin() + 0.3 / 1.7)).abs() < 1e-14);
    }

    #[test]
    fn free_symbols_are_reported() {
        let x = SxElem::sym("x");
        let z = SxElem::sym("z");
        let err = SxTape::record("f", &[x.clone()], &[x + z]).unwrap_err();
        match err {
            Error::FreeVariables { names, .. } => assert_eq!(names, vec!["z".to_string()]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn sparsity_sweeps_are_adjoint() {
        let x = SxElem::sym("x");
        let y = SxElem::sym("y");
        let tape = SxTape::record("f", &[x.clone(), y.clone()], &[x.sq(), x * y]).unwrap();
        let mut w = vec![0 as Bvec; tape.num_ops()];
        w[0] = 0b01;
        w[1] = 0b10;
        tape.sp_sweep_forward(&mut w);
        let out: Vec<Bvec> = tape.output_indices().iter().map(|&o| w[o as usize]).collect();
        assert_eq!(out, vec![0b01, 0b11]);

        let mut w = vec![0 as Bvec; tape.num_ops()];
        w[tape.output_indices()[0] as usize] |= 0b01;
        w[tape.output_indices()[1] as usize] |= 0b10;
        tape.sp_sweep_reverse(&mut w);
        assert_eq!(&w[..2], &[0b11, 0b10]);
    }
}
