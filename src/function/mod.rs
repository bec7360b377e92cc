//! Compiled, named mappings from a fixed list of inputs to a fixed list of
//! outputs.
//!
//! A [`Function`] is immutable once built and cheap to clone; every call
//! works only on caller-supplied buffers, so one Function can serve any
//! number of concurrent callers that each own their scratch (see
//! [`Memory`](crate::Memory)).
//!
//! Two bodies sit behind the same handle:
//! - an MX body, a flat instruction list over [`Mx`] nodes with one register
//!   per node, evaluated through each node's contract;
//! - an SX body, a scalar [`SxTape`] with common subexpressions merged and
//!   dead slots removed.
//!
//! Derivative Functions ([`forward`](Function::forward),
//! [`reverse`](Function::reverse), [`jacobian`](Function::jacobian)) are new
//! Functions built from the same body.

mod mx_algorithm;
#[cfg(feature = "serde")]
mod serde_support;
mod sx_tape;

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::bvec::{or_into, set_bits, unit_seeds, Bvec, BVEC_WIDTH};
use crate::codegen::CodeGenerator;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::matrix::{DMatrix, Matrix, SxMatrix};
use crate::mx::node::NodeEval;
use crate::mx::Mx;
use crate::sparsity::Sparsity;
use crate::sx::SxElem;

use mx_algorithm::MxAlgorithm;
pub use sx_tape::SxTape;

#[derive(Clone)]
enum Body {
    Mx(MxAlgorithm),
    Sx(SxTape),
}

#[derive(Clone)]
struct FunctionInternal {
    name: String,
    name_in: Vec<String>,
    name_out: Vec<String>,
    sparsity_in: Vec<Sparsity>,
    sparsity_out: Vec<Sparsity>,
    body: Body,
    sz_arg: usize,
    sz_res: usize,
    sz_iw: usize,
    sz_w: usize,
}

/// Shared handle to a compiled Function.
#[derive(Clone)]
pub struct Function(Arc<FunctionInternal>);

fn default_names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{}", prefix, i)).collect()
}

fn check_index(function: &str, what: &'static str, index: usize, count: usize) -> Result<()> {
    if index >= count {
        return Err(Error::ArgumentCount {
            function: function.to_string(),
            what,
            expected: count,
            got: index + 1,
        });
    }
    Ok(())
}

impl Function {
    /// Compile the graph from `inputs` to `outputs`. Every input must be a
    /// symbolic node, and every symbol the outputs depend on must be an input.
    pub fn mx(name: impl Into<String>, inputs: &[Mx], outputs: &[Mx]) -> Result<Function> {
        let name = name.into();
        let alg = MxAlgorithm::compile(&name, inputs, outputs)?;
        let max_arity = alg.max_arity;
        let internal = FunctionInternal {
            name_in: default_names("i", inputs.len()),
            name_out: default_names("o", outputs.len()),
            sparsity_in: inputs.iter().map(|x| x.sparsity().clone()).collect(),
            sparsity_out: outputs.iter().map(|x| x.sparsity().clone()).collect(),
            sz_arg: inputs.len().max(max_arity),
            sz_res: outputs.len().max(1),
            sz_iw: alg.sz_node_iw,
            sz_w: alg.sz_w(),
            body: Body::Mx(alg),
            name,
        };
        Ok(Function::finish(internal))
    }

    /// Record the scalar expressions `outputs` as functions of the symbolic
    /// matrices `inputs`. Every input nonzero must be a plain symbol.
    pub fn sx(name: impl Into<String>, inputs: &[SxMatrix], outputs: &[SxMatrix]) -> Result<Function> {
        let name = name.into();
        for (i, input) in inputs.iter().enumerate() {
            if !input.nonzeros().iter().all(SxElem::is_symbolic) {
                return Err(Error::NonSymbolicInput {
                    function: name.clone(),
                    index: i,
                });
            }
        }
        let flat_in: Vec<SxElem> = inputs.iter().flat_map(|m| m.nonzeros().iter().cloned()).collect();
        let flat_out: Vec<SxElem> = outputs.iter().flat_map(|m| m.nonzeros().iter().cloned()).collect();
        let tape = SxTape::record(&name, &flat_in, &flat_out)?;
        Function::from_tape(
            name,
            tape,
            inputs.iter().map(|m| m.sparsity().clone()).collect(),
            outputs.iter().map(|m| m.sparsity().clone()).collect(),
        )
    }

    /// Wrap an existing tape, for instance one restored through serde.
    pub fn from_tape(
        name: impl Into<String>,
        tape: SxTape,
        sparsity_in: Vec<Sparsity>,
        sparsity_out: Vec<Sparsity>,
    ) -> Result<Function> {
        let name = name.into();
        let nnz_in: usize = sparsity_in.iter().map(Sparsity::nnz).sum();
        let nnz_out: usize = sparsity_out.iter().map(Sparsity::nnz).sum();
        if nnz_in != tape.num_inputs() || nnz_out != tape.num_outputs() {
            return Err(Error::dimension(
                "function",
                format!(
                    "'{}': tape has {} inputs and {} outputs, patterns declare {} and {}",
                    name,
                    tape.num_inputs(),
                    tape.num_outputs(),
                    nnz_in,
                    nnz_out
                ),
            ));
        }
        let internal = FunctionInternal {
            name_in: default_names("i", sparsity_in.len()),
            name_out: default_names("o", sparsity_out.len()),
            sz_arg: sparsity_in.len(),
            sz_res: sparsity_out.len().max(1),
            sz_iw: 0,
            sz_w: tape.num_ops(),
            sparsity_in,
            sparsity_out,
            body: Body::Sx(tape),
            name,
        };
        Ok(Function::finish(internal))
    }

    fn finish(internal: FunctionInternal) -> Function {
        let (kind, size) = match &internal.body {
            Body::Mx(alg) => ("mx", alg.instructions.len()),
            Body::Sx(tape) => ("sx", tape.num_ops()),
        };
        debug!(
            "function '{}' ({}): {} instructions, sz_arg={} sz_res={} sz_iw={} sz_w={}",
            internal.name, kind, size, internal.sz_arg, internal.sz_res, internal.sz_iw, internal.sz_w
        );
        Function(Arc::new(internal))
    }

    /// Same Function with new input and output names.
    pub fn with_names(&self, name_in: &[&str], name_out: &[&str]) -> Result<Function> {
        if name_in.len() != self.n_in() {
            return Err(Error::ArgumentCount {
                function: self.name().to_string(),
                what: "input names",
                expected: self.n_in(),
                got: name_in.len(),
            });
        }
        if name_out.len() != self.n_out() {
            return Err(Error::ArgumentCount {
                function: self.name().to_string(),
                what: "output names",
                expected: self.n_out(),
                got: name_out.len(),
            });
        }
        let mut internal = (*self.0).clone();
        internal.name_in = name_in.iter().map(|s| s.to_string()).collect();
        internal.name_out = name_out.iter().map(|s| s.to_string()).collect();
        Ok(Function(Arc::new(internal)))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn n_in(&self) -> usize {
        self.0.sparsity_in.len()
    }

    pub fn n_out(&self) -> usize {
        self.0.sparsity_out.len()
    }

    pub fn sparsity_in(&self, i: usize) -> &Sparsity {
        &self.0.sparsity_in[i]
    }

    pub fn sparsity_out(&self, i: usize) -> &Sparsity {
        &self.0.sparsity_out[i]
    }

    pub fn nnz_in(&self, i: usize) -> usize {
        self.0.sparsity_in[i].nnz()
    }

    pub fn nnz_out(&self, i: usize) -> usize {
        self.0.sparsity_out[i].nnz()
    }

    pub fn name_in(&self, i: usize) -> &str {
        &self.0.name_in[i]
    }

    pub fn name_out(&self, i: usize) -> &str {
        &self.0.name_out[i]
    }

    pub fn index_in(&self, name: &str) -> Option<usize> {
        self.0.name_in.iter().position(|n| n == name)
    }

    pub fn index_out(&self, name: &str) -> Option<usize> {
        self.0.name_out.iter().position(|n| n == name)
    }

    /// Argument pointer slots a call needs.
    pub fn sz_arg(&self) -> usize {
        self.0.sz_arg
    }

    /// Result pointer slots a call needs.
    pub fn sz_res(&self) -> usize {
        self.0.sz_res
    }

    /// Integer scratch words a call needs.
    pub fn sz_iw(&self) -> usize {
        self.0.sz_iw
    }

    /// Floating scratch words a call needs.
    pub fn sz_w(&self) -> usize {
        self.0.sz_w
    }

    pub fn is_sx(&self) -> bool {
        matches!(self.0.body, Body::Sx(_))
    }

    /// The scalar tape of an SX Function.
    pub fn sx_tape(&self) -> Option<&SxTape> {
        match &self.0.body {
            Body::Sx(tape) => Some(tape),
            Body::Mx(_) => None,
        }
    }

    fn check_buffers<T, R>(&self, arg: &[Option<&[T]>], res: &[Option<R>], iw: usize, w: usize) -> Result<()>
    where
        R: AsRef<[T]>,
    {
        if arg.len() != self.n_in() {
            return Err(Error::ArgumentCount {
                function: self.name().to_string(),
                what: "inputs",
                expected: self.n_in(),
                got: arg.len(),
            });
        }
        if res.len() != self.n_out() {
            return Err(Error::ArgumentCount {
                function: self.name().to_string(),
                what: "outputs",
                expected: self.n_out(),
                got: res.len(),
            });
        }
        for (i, a) in arg.iter().enumerate() {
            if let Some(a) = a {
                if a.len() < self.nnz_in(i) {
                    return Err(Error::dimension(
                        "call",
                        format!("input {} of '{}' has {} values, needs {}", i, self.name(), a.len(), self.nnz_in(i)),
                    ));
                }
            }
        }
        for (o, r) in res.iter().enumerate() {
            if let Some(r) = r {
                if r.as_ref().len() < self.nnz_out(o) {
                    return Err(Error::dimension(
                        "call",
                        format!(
                            "output {} of '{}' has room for {} values, needs {}",
                            o,
                            self.name(),
                            r.as_ref().len(),
                            self.nnz_out(o)
                        ),
                    ));
                }
            }
        }
        if iw < self.sz_iw() {
            return Err(Error::WorkspaceTooSmall {
                function: self.name().to_string(),
                buffer: "iw",
                required: self.sz_iw(),
                got: iw,
            });
        }
        if w < self.sz_w() {
            return Err(Error::WorkspaceTooSmall {
                function: self.name().to_string(),
                buffer: "w",
                required: self.sz_w(),
                got: w,
            });
        }
        Ok(())
    }

    fn eval_gen<T: NodeEval>(
        &self,
        arg: &[Option<&[T]>],
        res: &mut [Option<&mut [T]>],
        iw: &mut [usize],
        w: &mut [T],
    ) -> Result<()> {
        match &self.0.body {
            Body::Mx(alg) => alg.eval(arg, res, iw, w),
            Body::Sx(tape) => {
                let mut offset = 0;
                for (a, sp) in arg.iter().zip(&self.0.sparsity_in) {
                    let dst = &mut w[offset..offset + sp.nnz()];
                    match a {
                        Some(a) => dst.clone_from_slice(&a[..sp.nnz()]),
                        None => dst.fill(T::zero()),
                    }
                    offset += sp.nnz();
                }
                tape.sweep(w);
                let mut offset = 0;
                for (r, sp) in res.iter_mut().zip(&self.0.sparsity_out) {
                    if let Some(r) = r {
                        let slots = &tape.output_indices()[offset..offset + sp.nnz()];
                        for (dst, &s) in r.iter_mut().zip(slots) {
                            *dst = w[s as usize].clone();
                        }
                    }
                    offset += sp.nnz();
                }
                Ok(())
            }
        }
    }

    /// Evaluate on caller-supplied buffers. `None` inputs read as zero and
    /// `None` outputs are not written. `iw` and `w` must hold at least
    /// [`sz_iw`](Self::sz_iw) and [`sz_w`](Self::sz_w) words.
    pub fn call_with(
        &self,
        arg: &[Option<&[f64]>],
        res: &mut [Option<&mut [f64]>],
        iw: &mut [usize],
        w: &mut [f64],
    ) -> Result<()> {
        self.check_buffers(arg, res, iw.len(), w.len())?;
        self.eval_gen(arg, res, iw, w)
    }

    /// Evaluate on nonzero vectors, allocating scratch and results.
    pub fn call<A: AsRef<[f64]>>(&self, args: &[A]) -> Result<Vec<Vec<f64>>> {
        let arg: Vec<Option<&[f64]>> = args.iter().map(|a| Some(a.as_ref())).collect();
        let mut out: Vec<Vec<f64>> = (0..self.n_out()).map(|o| vec![0.0; self.nnz_out(o)]).collect();
        {
            let mut res: Vec<Option<&mut [f64]>> = out.iter_mut().map(|o| Some(o.as_mut_slice())).collect();
            let mut iw = vec![0; self.sz_iw()];
            let mut w = vec![0.0; self.sz_w()];
            self.call_with(&arg, &mut res, &mut iw, &mut w)?;
        }
        Ok(out)
    }

    fn call_matrices<T: NodeEval>(&self, args: &[Matrix<T>]) -> Result<Vec<Matrix<T>>> {
        if args.len() != self.n_in() {
            return Err(Error::ArgumentCount {
                function: self.name().to_string(),
                what: "inputs",
                expected: self.n_in(),
                got: args.len(),
            });
        }
        let mut projected = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            let sp = self.sparsity_in(i);
            if a.shape() != sp.shape() {
                return Err(Error::dimension(
                    "call",
                    format!(
                        "input {} of '{}' is {}, expected {}",
                        i,
                        self.name(),
                        a.sparsity().dim_string(),
                        sp.dim_string()
                    ),
                ));
            }
            projected.push(a.project(sp)?);
        }
        let arg: Vec<Option<&[T]>> = projected.iter().map(|a| Some(a.nonzeros())).collect();
        let mut out: Vec<Vec<T>> = (0..self.n_out()).map(|o| vec![T::zero(); self.nnz_out(o)]).collect();
        {
            let mut res: Vec<Option<&mut [T]>> = out.iter_mut().map(|o| Some(o.as_mut_slice())).collect();
            let mut iw = vec![0; self.sz_iw()];
            let mut w = vec![T::zero(); self.sz_w()];
            self.eval_gen(&arg, &mut res, &mut iw, &mut w)?;
        }
        out.into_iter()
            .enumerate()
            .map(|(o, nz)| Matrix::new(self.sparsity_out(o).clone(), nz))
            .collect()
    }

    /// Evaluate on numeric matrices; arguments are projected onto the input patterns.
    pub fn call_numeric(&self, args: &[DMatrix]) -> Result<Vec<DMatrix>> {
        self.call_matrices(args)
    }

    /// Evaluate on symbolic matrices, producing scalar expressions.
    pub fn call_symbolic(&self, args: &[SxMatrix]) -> Result<Vec<SxMatrix>> {
        self.call_matrices(args)
    }

    /// Apply the Function to graph arguments. MX bodies are inlined, so the
    /// result is an ordinary graph over `args`.
    pub fn call_mx(&self, args: &[Mx]) -> Result<Vec<Mx>> {
        if args.len() != self.n_in() {
            return Err(Error::ArgumentCount {
                function: self.name().to_string(),
                what: "inputs",
                expected: self.n_in(),
                got: args.len(),
            });
        }
        for (i, a) in args.iter().enumerate() {
            if a.shape() != self.sparsity_in(i).shape() {
                return Err(Error::dimension(
                    "call",
                    format!(
                        "input {} of '{}' is {}, expected {}",
                        i,
                        self.name(),
                        a.sparsity().dim_string(),
                        self.sparsity_in(i).dim_string()
                    ),
                ));
            }
        }
        match &self.0.body {
            Body::Mx(alg) => alg.substitute(args),
            Body::Sx(_) => Err(Error::InvalidState {
                detail: format!("'{}' has a scalar body and cannot be applied to graph arguments", self.name()),
            }),
        }
    }

    /// Forward dependency propagation. `None` inputs carry no marks; `None`
    /// outputs are not written.
    pub fn sp_forward(&self, arg: &[Option<&[Bvec]>], res: &mut [Option<&mut [Bvec]>]) -> Result<()> {
        self.check_buffers(arg, res, self.sz_iw(), self.sz_w())?;
        let mut iw = vec![0; self.sz_iw()];
        let mut w: Vec<Bvec> = vec![0; self.sz_w()];
        match &self.0.body {
            Body::Mx(alg) => alg.sp_forward(arg, res, &mut iw, &mut w),
            Body::Sx(tape) => {
                let mut offset = 0;
                for (a, sp) in arg.iter().zip(&self.0.sparsity_in) {
                    if let Some(a) = a {
                        w[offset..offset + sp.nnz()].copy_from_slice(&a[..sp.nnz()]);
                    }
                    offset += sp.nnz();
                }
                tape.sp_sweep_forward(&mut w);
                let mut offset = 0;
                for (r, sp) in res.iter_mut().zip(&self.0.sparsity_out) {
                    if let Some(r) = r {
                        for (dst, &s) in r.iter_mut().zip(&tape.output_indices()[offset..offset + sp.nnz()]) {
                            *dst = w[s as usize];
                        }
                    }
                    offset += sp.nnz();
                }
            }
        }
        Ok(())
    }

    /// Reverse dependency propagation: output marks are ORed into the
    /// input buffers, and the output buffers are cleared.
    pub fn sp_reverse(&self, arg: &mut [Option<&mut [Bvec]>], res: &mut [Option<&mut [Bvec]>]) -> Result<()> {
        {
            let arg_view: Vec<Option<&[Bvec]>> = arg.iter().map(|a| a.as_deref()).collect();
            self.check_buffers(&arg_view, res, self.sz_iw(), self.sz_w())?;
        }
        let mut iw = vec![0; self.sz_iw()];
        let mut w: Vec<Bvec> = vec![0; self.sz_w()];
        match &self.0.body {
            Body::Mx(alg) => alg.sp_reverse(arg, res, &mut iw, &mut w),
            Body::Sx(tape) => {
                let mut offset = 0;
                for (r, sp) in res.iter_mut().zip(&self.0.sparsity_out) {
                    if let Some(r) = r {
                        for (src, &s) in r.iter_mut().zip(&tape.output_indices()[offset..offset + sp.nnz()]) {
                            w[s as usize] |= *src;
                            *src = 0;
                        }
                    }
                    offset += sp.nnz();
                }
                tape.sp_sweep_reverse(&mut w);
                let mut offset = 0;
                for (a, sp) in arg.iter_mut().zip(&self.0.sparsity_in) {
                    if let Some(a) = a {
                        or_into(&mut a[..sp.nnz()], &w[offset..offset + sp.nnz()]);
                    }
                    offset += sp.nnz();
                }
            }
        }
        Ok(())
    }

    /// Structural Jacobian of output `oind` with respect to input `iind`, as
    /// a `numel_out x numel_in` pattern. Propagates 64 input nonzeros per sweep.
    pub fn jacobian_sparsity(&self, iind: usize, oind: usize) -> Result<Sparsity> {
        check_index(self.name(), "input index", iind, self.n_in())?;
        check_index(self.name(), "output index", oind, self.n_out())?;
        let sp_in = self.sparsity_in(iind);
        let sp_out = self.sparsity_out(oind);
        let in_pos: Vec<usize> = sp_in.iter().map(|(r, c, _)| r + c * sp_in.nrow()).collect();

        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < sp_in.nnz() {
            let seed = unit_seeds(sp_in.nnz(), offset);
            let mut out: Vec<Bvec> = vec![0; sp_out.nnz()];
            {
                let mut arg: Vec<Option<&[Bvec]>> = vec![None; self.n_in()];
                arg[iind] = Some(seed.as_slice());
                let mut res: Vec<Option<&mut [Bvec]>> = (0..self.n_out()).map(|_| None).collect();
                res[oind] = Some(out.as_mut_slice());
                self.sp_forward(&arg, &mut res)?;
            }
            for (r, c, k) in sp_out.iter() {
                for b in set_bits(out[k]) {
                    entries.push((r + c * sp_out.nrow(), in_pos[offset + b]));
                }
            }
            offset += BVEC_WIDTH;
        }
        Sparsity::triplet(sp_out.numel(), sp_in.numel(), &entries)
    }

    fn symbolic_inputs(&self) -> Vec<SxMatrix> {
        (0..self.n_in())
            .map(|i| SxMatrix::sym(self.name_in(i), self.sparsity_in(i).clone()))
            .collect()
    }

    /// Equivalent Function with a scalar body, obtained by evaluating every
    /// node symbolically.
    pub fn expand(&self) -> Result<Function> {
        if self.is_sx() {
            return Ok(self.clone());
        }
        let inputs = self.symbolic_inputs();
        let outputs = self.call_symbolic(&inputs)?;
        let names_in: Vec<&str> = self.0.name_in.iter().map(String::as_str).collect();
        let names_out: Vec<&str> = self.0.name_out.iter().map(String::as_str).collect();
        Function::sx(self.name(), &inputs, &outputs)?.with_names(&names_in, &names_out)
    }

    /// Function computing `nfwd` forward directional derivatives.
    ///
    /// Inputs: the nominal inputs, the nominal outputs (unused, kept for the
    /// calling convention), then one seed per input for every direction.
    /// Outputs: one sensitivity per output for every direction, on the
    /// output patterns.
    pub fn forward(&self, nfwd: usize) -> Result<Function> {
        let mut names_in: Vec<String> = self.0.name_in.clone();
        names_in.extend(self.0.name_out.iter().map(|n| format!("out_{}", n)));
        let mut names_out = Vec::with_capacity(nfwd * self.n_out());
        for d in 0..nfwd {
            names_in.extend(self.0.name_in.iter().map(|n| format!("fwd{}_{}", d, n)));
            names_out.extend(self.0.name_out.iter().map(|n| format!("fwd{}_{}", d, n)));
        }
        let name = format!("fwd{}_{}", nfwd, self.name());

        let f = match &self.0.body {
            Body::Mx(alg) => {
                let outs: Vec<Mx> = (0..self.n_out())
                    .map(|o| Mx::sym(format!("out_{}", self.name_out(o)), self.sparsity_out(o).clone()))
                    .collect();
                let seeds: Vec<Vec<Mx>> = (0..nfwd)
                    .map(|d| {
                        (0..self.n_in())
                            .map(|i| Mx::sym(format!("fwd{}_{}", d, self.name_in(i)), self.sparsity_in(i).clone()))
                            .collect()
                    })
                    .collect();
                let sens = crate::mx::forward(&alg.outputs, &alg.inputs, &seeds)?;
                let mut inputs = alg.inputs.clone();
                inputs.extend(outs);
                inputs.extend(seeds.into_iter().flatten());
                let mut outputs = Vec::with_capacity(nfwd * self.n_out());
                for dir in &sens {
                    for (o, t) in dir.iter().enumerate() {
                        outputs.push(t.project(self.sparsity_out(o))?);
                    }
                }
                Function::mx(name, &inputs, &outputs)?
            }
            Body::Sx(tape) => {
                let x = self.symbolic_inputs();
                let outs: Vec<SxMatrix> = (0..self.n_out())
                    .map(|o| SxMatrix::sym(&format!("out_{}", self.name_out(o)), self.sparsity_out(o).clone()))
                    .collect();
                let seeds: Vec<Vec<SxMatrix>> = (0..nfwd)
                    .map(|d| {
                        (0..self.n_in())
                            .map(|i| SxMatrix::sym(&format!("fwd{}_{}", d, self.name_in(i)), self.sparsity_in(i).clone()))
                            .collect()
                    })
                    .collect();
                let flat_seeds: Vec<Vec<SxElem>> = seeds.iter().map(|dir| flatten(dir)).collect();
                let (_, tangents) = tape.forward_symbolic(&flatten(&x), &flat_seeds);
                let mut outputs = Vec::with_capacity(nfwd * self.n_out());
                for t in tangents {
                    outputs.extend(split(&t, &self.0.sparsity_out)?);
                }
                let mut inputs = x;
                inputs.extend(outs);
                inputs.extend(seeds.into_iter().flatten());
                Function::sx(name, &inputs, &outputs)?
            }
        };
        let names_in: Vec<&str> = names_in.iter().map(String::as_str).collect();
        let names_out: Vec<&str> = names_out.iter().map(String::as_str).collect();
        f.with_names(&names_in, &names_out)
    }

    /// Function computing `nadj` adjoint sensitivities.
    ///
    /// Inputs: the nominal inputs, the nominal outputs, then one seed per
    /// output for every direction. Outputs: one sensitivity per input for
    /// every direction, on the input patterns.
    pub fn reverse(&self, nadj: usize) -> Result<Function> {
        let mut names_in: Vec<String> = self.0.name_in.clone();
        names_in.extend(self.0.name_out.iter().map(|n| format!("out_{}", n)));
        let mut names_out = Vec::with_capacity(nadj * self.n_in());
        for d in 0..nadj {
            names_in.extend(self.0.name_out.iter().map(|n| format!("adj{}_{}", d, n)));
            names_out.extend(self.0.name_in.iter().map(|n| format!("adj{}_{}", d, n)));
        }
        let name = format!("adj{}_{}", nadj, self.name());

        let f = match &self.0.body {
            Body::Mx(alg) => {
                let outs: Vec<Mx> = (0..self.n_out())
                    .map(|o| Mx::sym(format!("out_{}", self.name_out(o)), self.sparsity_out(o).clone()))
                    .collect();
                let seeds: Vec<Vec<Mx>> = (0..nadj)
                    .map(|d| {
                        (0..self.n_out())
                            .map(|o| Mx::sym(format!("adj{}_{}", d, self.name_out(o)), self.sparsity_out(o).clone()))
                            .collect()
                    })
                    .collect();
                let sens = crate::mx::reverse(&alg.outputs, &alg.inputs, &seeds)?;
                let mut inputs = alg.inputs.clone();
                inputs.extend(outs);
                inputs.extend(seeds.into_iter().flatten());
                let mut outputs = Vec::with_capacity(nadj * self.n_in());
                for dir in &sens {
                    for (i, s) in dir.iter().enumerate() {
                        outputs.push(s.project(self.sparsity_in(i))?);
                    }
                }
                Function::mx(name, &inputs, &outputs)?
            }
            Body::Sx(tape) => {
                let x = self.symbolic_inputs();
                let outs: Vec<SxMatrix> = (0..self.n_out())
                    .map(|o| SxMatrix::sym(&format!("out_{}", self.name_out(o)), self.sparsity_out(o).clone()))
                    .collect();
                let seeds: Vec<Vec<SxMatrix>> = (0..nadj)
                    .map(|d| {
                        (0..self.n_out())
                            .map(|o| SxMatrix::sym(&format!("adj{}_{}", d, self.name_out(o)), self.sparsity_out(o).clone()))
                            .collect()
                    })
                    .collect();
                let flat_seeds: Vec<Vec<SxElem>> = seeds.iter().map(|dir| flatten(dir)).collect();
                let (_, sens) = tape.reverse_symbolic(&flatten(&x), &flat_seeds);
                let mut outputs = Vec::with_capacity(nadj * self.n_in());
                for s in sens {
                    outputs.extend(split(&s, &self.0.sparsity_in)?);
                }
                let mut inputs = x;
                inputs.extend(outs);
                inputs.extend(seeds.into_iter().flatten());
                Function::sx(name, &inputs, &outputs)?
            }
        };
        let names_in: Vec<&str> = names_in.iter().map(String::as_str).collect();
        let names_out: Vec<&str> = names_out.iter().map(String::as_str).collect();
        f.with_names(&names_in, &names_out)
    }

    /// Function with the same inputs returning the Jacobian of output `oind`
    /// with respect to input `iind`, a `numel_out x numel_in` matrix whose
    /// pattern holds exactly the entries that are not constant zeros.
    pub fn jacobian(&self, iind: usize, oind: usize) -> Result<Function> {
        check_index(self.name(), "input index", iind, self.n_in())?;
        check_index(self.name(), "output index", oind, self.n_out())?;
        let sx = self.expand()?;
        let tape = sx.sx_tape().ok_or_else(|| Error::InvalidState {
            detail: format!("'{}' did not expand to a scalar body", self.name()),
        })?;
        let x = self.symbolic_inputs();
        let flat_x = flatten(&x);
        let in_offset: usize = (0..iind).map(|i| self.nnz_in(i)).sum();
        let out_offset: usize = (0..oind).map(|o| self.nnz_out(o)).sum();
        let sp_in = self.sparsity_in(iind);
        let sp_out = self.sparsity_out(oind);

        let seeds: Vec<Vec<SxElem>> = (0..sp_in.nnz())
            .map(|j| {
                let mut s = vec![SxElem::from_f64(0.0); flat_x.len()];
                s[in_offset + j] = SxElem::from_f64(1.0);
                s
            })
            .collect();
        let (_, tangents) = tape.forward_symbolic(&flat_x, &seeds);

        let mut entries: Vec<(usize, usize, SxElem)> = Vec::new();
        for ((r_in, c_in, _), t) in sp_in.iter().zip(&tangents) {
            let col = r_in + c_in * sp_in.nrow();
            for (r, c, k) in sp_out.iter() {
                let v = &t[out_offset + k];
                if !v.is_zero_constant() {
                    entries.push((col, r + c * sp_out.nrow(), v.clone()));
                }
            }
        }
        entries.sort_by_key(|&(c, r, _)| (c, r));
        let positions: Vec<(usize, usize)> = entries.iter().map(|&(c, r, _)| (r, c)).collect();
        let sp = Sparsity::from_sorted_entries(sp_out.numel(), sp_in.numel(), &positions);
        let jac = SxMatrix::new(sp, entries.into_iter().map(|(_, _, v)| v).collect())?;

        let names_in: Vec<&str> = self.0.name_in.iter().map(String::as_str).collect();
        let out_name = format!("jac_{}_{}", self.name_out(oind), self.name_in(iind));
        Function::sx(format!("jac_{}", self.name()), &x, &[jac])?.with_names(&names_in, &[out_name.as_str()])
    }

    /// Straight-line source for this Function: a routine
    /// `void name(const double** arg, double** res, long long* iw, double* w)`
    /// made of assignments only.
    pub fn generate(&self) -> String {
        let mut g = CodeGenerator::new();
        match &self.0.body {
            Body::Mx(alg) => alg.emit(&mut g),
            Body::Sx(tape) => {
                let inputs: Vec<String> = (0..self.n_in())
                    .flat_map(|i| (0..self.nnz_in(i)).map(move |k| format!("arg[{}][{}]", i, k)))
                    .collect();
                let outputs: Vec<Option<String>> = (0..self.n_out())
                    .flat_map(|o| (0..self.nnz_out(o)).map(move |k| Some(format!("res[{}][{}]", o, k))))
                    .collect();
                tape.emit(&mut g, &inputs, &outputs);
            }
        }
        g.finish(&format!(
            "void {}(const double** arg, double** res, long long* iw, double* w)",
            self.name()
        ))
    }
}

fn flatten(m: &[SxMatrix]) -> Vec<SxElem> {
    m.iter().flat_map(|m| m.nonzeros().iter().cloned()).collect()
}

fn split(flat: &[SxElem], patterns: &[Sparsity]) -> Result<Vec<SxMatrix>> {
    let mut offset = 0;
    patterns
        .iter()
        .map(|sp| {
            let m = Matrix::new(sp.clone(), flat[offset..offset + sp.nnz()].to_vec());
            offset += sp.nnz();
            m
        })
        .collect()
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |names: &[String], sps: &[Sparsity]| -> String {
            names
                .iter()
                .zip(sps)
                .map(|(n, s)| format!("{}[{}]", n, s))
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "{}:({})->({})",
            self.name(),
            side(&self.0.name_in, &self.0.sparsity_in),
            side(&self.0.name_out, &self.0.sparsity_out)
        )
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn affine() -> Function {
        let a = Mx::sym_dense("a", 2, 2);
        let x = Mx::sym_dense("x", 2, 1);
        let y = a.mtimes(&x).unwrap().add(&x).unwrap();
        Function::mx("affine", &[a, x], &[y]).unwrap()
    }

    #[test]
    fn mx_call_evaluates_graph() {
        let f = affine();
        // a = [1 3; 2 4] column-major
        let out = f.call(&[vec![1.0, 2.0, 3.0, 4.0], vec![1.0, 1.0]]).unwrap();
        assert_relative_eq!(out[0][0], 5.0);
        assert_relative_eq!(out[0][1], 7.0);
    }

    #[test]
    fn none_arguments_read_as_zero() {
        let f = affine();
        let x = [1.0, 2.0];
        let mut y = [9.0, 9.0];
        let mut iw = vec![0; f.sz_iw()];
        let mut w = vec![0.0; f.sz_w()];
        f.call_with(&[None, Some(&x[..])], &mut [Some(&mut y[..])], &mut iw, &mut w)
            .unwrap();
        assert_eq!(y, [1.0, 2.0]);
    }

    #[test]
    fn small_workspace_is_rejected() {
        let f = affine();
        let mut y = [0.0; 2];
        let mut w = vec![0.0; f.sz_w() - 1];
        let err = f
            .call_with(&[None, None], &mut [Some(&mut y[..])], &mut [], &mut w)
            .unwrap_err();
        assert!(matches!(err, Error::WorkspaceTooSmall { buffer: "w", .. }));
    }

    #[test]
    fn free_symbols_are_rejected() {
        let x = Mx::sym_dense("x", 2, 1);
        let p = Mx::sym_dense("p", 2, 1);
        let err = Function::mx("f", &[x.clone()], &[x.add(&p).unwrap()]).unwrap_err();
        assert!(matches!(err, Error::FreeVariables { .. }));
        let err = Function::mx("f", &[x.add(&x).unwrap()], &[x]).unwrap_err();
        assert!(matches!(err, Error::NonSymbolicInput { index: 0, .. }));
    }

    #[test]
    fn expand_agrees_with_mx_body() {
        let f = affine();
        let g = f.expand().unwrap();
        assert!(g.is_sx());
        let args = [vec![0.5, -1.0, 2.0, 3.0], vec![0.25, -4.0]];
        let a = f.call(&args).unwrap();
        let b = g.call(&args).unwrap();
        for (u, v) in a[0].iter().zip(&b[0]) {
            assert_relative_eq!(u, v, epsilon = 1e-14);
        }
    }

    #[test]
    fn jacobian_sparsity_of_diagonal_map() {
        let x = Mx::sym_dense("x", 3, 1);
        let two = Mx::scalar(2.0);
        let f = Function::mx("f", &[x.clone()], &[x.scale(&two).unwrap()]).unwrap();
        let sp = f.jacobian_sparsity(0, 0).unwrap();
        assert_eq!(sp, Sparsity::diag(3));
    }

    #[test]
    fn names_are_configurable() {
        let f = affine().with_names(&["A", "x"], &["y"]).unwrap();
        assert_eq!(f.index_in("x"), Some(1));
        assert_eq!(f.name_out(0), "y");
        assert!(affine().with_names(&["A"], &["y"]).is_err());
    }
}
