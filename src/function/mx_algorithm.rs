//! Compiled MX graph: a flat instruction list with one register per node.
//!
//! Registers are laid out in instruction order inside the floating work
//! vector, so every dependency of an instruction lives strictly below the
//! instruction's own register. The dependency marks of the reverse sweep
//! follow the registers, then the node scratch shared by all instructions.

use std::collections::{HashMap, HashSet};

use crate::bvec::{or_into, Bvec};
use crate::codegen::{CodeGenerator, Register};
use crate::error::{Error, Result};
use crate::mx::node::{NodeEval, MAX_ARITY};
use crate::mx::{position_map, topo_sort, Mx};

#[derive(Clone)]
pub(crate) struct Instruction {
    pub(crate) node: Mx,
    pub(crate) deps: Vec<usize>,
    pub(crate) offset: usize,
    pub(crate) nnz: usize,
    /// Function input this instruction loads, for symbolic leaves.
    pub(crate) input: Option<usize>,
}

#[derive(Clone)]
pub(crate) struct MxAlgorithm {
    pub(crate) inputs: Vec<Mx>,
    pub(crate) outputs: Vec<Mx>,
    pub(crate) instructions: Vec<Instruction>,
    /// Instruction producing each Function output.
    pub(crate) output_instr: Vec<usize>,
    pub(crate) sz_registers: usize,
    /// Largest total nonzero count over the dependencies of one instruction.
    pub(crate) sz_marks: usize,
    pub(crate) sz_node_w: usize,
    pub(crate) sz_node_iw: usize,
    pub(crate) max_arity: usize,
}

impl MxAlgorithm {
    pub(crate) fn compile(function: &str, inputs: &[Mx], outputs: &[Mx]) -> Result<MxAlgorithm> {
        let mut input_index: HashMap<usize, usize> = HashMap::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            if !input.is_symbolic() {
                return Err(Error::NonSymbolicInput {
                    function: function.to_string(),
                    index: i,
                });
            }
            input_index.entry(input.key()).or_insert(i);
        }

        let order = topo_sort(outputs);
        let free: Vec<String> = order
            .iter()
            .filter(|n| n.is_symbolic() && !input_index.contains_key(&n.key()))
            .filter_map(|n| n.name().map(str::to_string))
            .collect::<Vec<_>>();
        if !free.is_empty() {
            let mut seen = HashSet::new();
            let names = free.into_iter().filter(|n| seen.insert(n.clone())).collect();
            return Err(Error::FreeVariables {
                function: function.to_string(),
                names,
            });
        }

        let position = position_map(&order);
        let mut instructions = Vec::with_capacity(order.len());
        let mut offset = 0;
        let (mut sz_marks, mut sz_node_w, mut sz_node_iw, mut max_arity) = (0, 0, 0, 0);
        for node in &order {
            let contract = node.op().contract();
            debug_assert!(node.n_dep() <= MAX_ARITY);
            sz_marks = sz_marks.max(node.deps().iter().map(Mx::nnz).sum());
            sz_node_w = sz_node_w.max(contract.sz_w(node));
            sz_node_iw = sz_node_iw.max(contract.sz_iw(node));
            max_arity = max_arity.max(node.n_dep());
            let deps = node.deps().iter().map(|d| position[&d.key()]).collect();
            instructions.push(Instruction {
                node: node.clone(),
                deps,
                offset,
                nnz: node.nnz(),
                input: input_index.get(&node.key()).copied(),
            });
            offset += node.nnz();
        }
        let output_instr = outputs.iter().map(|o| position[&o.key()]).collect();

        Ok(MxAlgorithm {
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            instructions,
            output_instr,
            sz_registers: offset,
            sz_marks,
            sz_node_w,
            sz_node_iw,
            max_arity,
        })
    }

    pub(crate) fn sz_w(&self) -> usize {
        self.sz_registers + self.sz_marks + self.sz_node_w
    }

    fn dep_registers<'a, T>(&self, instr: &Instruction, lower: &'a [T]) -> [&'a [T]; MAX_ARITY] {
        let mut args: [&'a [T]; MAX_ARITY] = [&[][..]; MAX_ARITY];
        for (slot, &d) in args.iter_mut().zip(&instr.deps) {
            let dep = &self.instructions[d];
            *slot = &lower[dep.offset..dep.offset + dep.nnz];
        }
        args
    }

    pub(crate) fn eval<T: NodeEval>(
        &self,
        arg: &[Option<&[T]>],
        res: &mut [Option<&mut [T]>],
        iw: &mut [usize],
        w: &mut [T],
    ) -> Result<()> {
        let (regs, scratch) = w.split_at_mut(self.sz_registers);
        for instr in &self.instructions {
            let (lower, upper) = regs.split_at_mut(instr.offset);
            let out = &mut upper[..instr.nnz];
            if let Some(k) = instr.input {
                match arg[k] {
                    Some(a) => out.clone_from_slice(&a[..instr.nnz]),
                    None => out.fill(T::zero()),
                }
                continue;
            }
            let args = self.dep_registers(instr, lower);
            let args = &args[..instr.deps.len()];
            T::eval_node(&instr.node, args, out, iw, scratch)?;
        }
        for (r, &o) in res.iter_mut().zip(&self.output_instr) {
            if let Some(r) = r {
                let instr = &self.instructions[o];
                r[..instr.nnz].clone_from_slice(&regs[instr.offset..instr.offset + instr.nnz]);
            }
        }
        Ok(())
    }

    pub(crate) fn sp_forward(
        &self,
        arg: &[Option<&[Bvec]>],
        res: &mut [Option<&mut [Bvec]>],
        iw: &mut [usize],
        w: &mut [Bvec],
    ) {
        let (regs, scratch) = w.split_at_mut(self.sz_registers);
        for instr in &self.instructions {
            let (lower, upper) = regs.split_at_mut(instr.offset);
            let out = &mut upper[..instr.nnz];
            if let Some(k) = instr.input {
                match arg[k] {
                    Some(a) => out.copy_from_slice(&a[..instr.nnz]),
                    None => out.fill(0),
                }
                continue;
            }
            let args = self.dep_registers(instr, lower);
            let args = &args[..instr.deps.len()];
            instr.node.op().contract().sp_forward(&instr.node, args, out, iw, scratch);
        }
        for (r, &o) in res.iter_mut().zip(&self.output_instr) {
            if let Some(r) = r {
                let instr = &self.instructions[o];
                r[..instr.nnz].copy_from_slice(&regs[instr.offset..instr.offset + instr.nnz]);
            }
        }
    }

    pub(crate) fn sp_reverse(
        &self,
        arg: &mut [Option<&mut [Bvec]>],
        res: &mut [Option<&mut [Bvec]>],
        iw: &mut [usize],
        w: &mut [Bvec],
    ) {
        let (regs, rest) = w.split_at_mut(self.sz_registers);
        let (marks, scratch) = rest.split_at_mut(self.sz_marks);
        regs.fill(0);
        for (r, &o) in res.iter_mut().zip(&self.output_instr) {
            if let Some(r) = r {
                let instr = &self.instructions[o];
                or_into(&mut regs[instr.offset..instr.offset + instr.nnz], &r[..instr.nnz]);
                r.fill(0);
            }
        }
        for instr in self.instructions.iter().rev() {
            let out = instr.offset..instr.offset + instr.nnz;
            if let Some(k) = instr.input {
                if let Some(a) = arg[k].as_deref_mut() {
                    or_into(&mut a[..instr.nnz], &regs[out.clone()]);
                }
                regs[out].fill(0);
                continue;
            }
            let mut slots: [&mut [Bvec]; MAX_ARITY] = Default::default();
            let mut free = &mut marks[..];
            for (slot, &d) in slots.iter_mut().zip(&instr.deps) {
                let (head, tail) = std::mem::take(&mut free).split_at_mut(self.instructions[d].nnz);
                head.fill(0);
                *slot = head;
                free = tail;
            }
            let arity = instr.deps.len();
            instr
                .node
                .op()
                .contract()
                .sp_reverse(&instr.node, &mut slots[..arity], &mut regs[out], iw, scratch);
            for (&d, m) in instr.deps.iter().zip(&slots) {
                let dep = &self.instructions[d];
                or_into(&mut regs[dep.offset..dep.offset + dep.nnz], m);
            }
        }
    }

    pub(crate) fn emit(&self, g: &mut CodeGenerator) {
        let reg = |instr: &Instruction| Register::new("w", instr.offset);
        for instr in &self.instructions {
            if let Some(k) = instr.input {
                let src = Register::new(format!("arg[{}]", k), 0);
                for j in 0..instr.nnz {
                    g.assign(reg(instr).at(j), src.at(j));
                }
                continue;
            }
            let args: Vec<Register> = instr.deps.iter().map(|&d| reg(&self.instructions[d])).collect();
            instr
                .node
                .op()
                .contract()
                .emit_code(&instr.node, g, &args, &reg(instr));
        }
        for (o, &i) in self.output_instr.iter().enumerate() {
            let instr = &self.instructions[i];
            let dst = Register::new(format!("res[{}]", o), 0);
            for j in 0..instr.nnz {
                g.assign(dst.at(j), reg(instr).at(j));
            }
        }
    }

    /// Inline the graph on new arguments: every input node is replaced by the
    /// corresponding entry of `args` and the remaining nodes are rebuilt.
    pub(crate) fn substitute(&self, args: &[Mx]) -> Result<Vec<Mx>> {
        let mut value: Vec<Mx> = Vec::with_capacity(self.instructions.len());
        for instr in &self.instructions {
            let v = match instr.input {
                Some(k) => args[k].project(instr.node.sparsity())?,
                None => {
                    let deps: Vec<Mx> = instr.deps.iter().map(|&d| value[d].clone()).collect();
                    if deps.iter().zip(instr.node.deps()).all(|(a, b)| a.ptr_eq(b)) {
                        instr.node.clone()
                    } else {
                        instr.node.with_deps(&deps)?
                    }
                }
            };
            value.push(v);
        }
        Ok(self.output_instr.iter().map(|&o| value[o].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;

    #[test]
    fn marks_cover_the_widest_instruction() {
        let a = Mx::sym_dense("a", 3, 2);
        let v = Mx::sym_dense("v", 2, 1);
        let alg = MxAlgorithm::compile("f", &[a.clone(), v.clone()], &[a.mtimes(&v).unwrap()]).unwrap();
        assert_eq!(alg.sz_marks, 8);
        assert_eq!(alg.sz_w(), alg.sz_registers + 8 + alg.sz_node_w);
    }

    #[test]
    fn repeated_dependency_marks_are_merged() {
        let x = Mx::sym_dense("x", 2, 1);
        let f = Function::mx("f", &[x.clone()], &[x.add(&x).unwrap()]).unwrap();
        let mut arg = vec![0u64; 2];
        let mut res = vec![0b01, 0b10];
        f.sp_reverse(&mut [Some(arg.as_mut_slice())], &mut [Some(res.as_mut_slice())])
            .unwrap();
        assert_eq!(arg, vec![0b01, 0b10]);
        assert_eq!(res, vec![0, 0]);
    }
}
