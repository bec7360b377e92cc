//! Per-instance working storage.
//!
//! A [`Memory`] is sized once for every [`Function`] its owner will call and
//! then reused for every evaluation. It is not synchronised: one instance
//! serves one evaluation at a time, and concurrent callers each own their
//! own instance.

use num_traits::Zero;

use crate::error::Result;
use crate::function::Function;

/// Scratch buffers sized to the union of the Functions they serve.
#[derive(Debug, Clone, Default)]
pub struct Memory<T> {
    sz_arg: usize,
    sz_res: usize,
    sz_w_functions: usize,
    sz_w_extra: usize,
    iw: Vec<usize>,
    w: Vec<T>,
}

impl<T: Clone + Zero> Memory<T> {
    pub fn new() -> Self {
        Memory {
            sz_arg: 0,
            sz_res: 0,
            sz_w_functions: 0,
            sz_w_extra: 0,
            iw: Vec::new(),
            w: Vec::new(),
        }
    }

    /// Grow every buffer to cover the requirements of `f`. Never shrinks.
    pub fn alloc(&mut self, f: &Function) {
        self.sz_arg = self.sz_arg.max(f.sz_arg());
        self.sz_res = self.sz_res.max(f.sz_res());
        if self.iw.len() < f.sz_iw() {
            self.iw.resize(f.sz_iw(), 0);
        }
        self.sz_w_functions = self.sz_w_functions.max(f.sz_w());
        self.resize_w();
    }

    /// Reserve `n` additional floating words on top of the Function scratch,
    /// for temporaries handed out by [`split_w`](Self::split_w).
    pub fn alloc_w(&mut self, n: usize) {
        self.sz_w_extra += n;
        self.resize_w();
    }

    fn resize_w(&mut self) {
        let need = self.sz_w_functions + self.sz_w_extra;
        if self.w.len() < need {
            self.w.resize(need, T::zero());
        }
    }

    /// Drop every requirement and release the buffers.
    pub fn clear(&mut self) {
        *self = Memory::new();
    }

    pub fn sz_arg(&self) -> usize {
        self.sz_arg
    }

    pub fn sz_res(&self) -> usize {
        self.sz_res
    }

    pub fn sz_iw(&self) -> usize {
        self.iw.len()
    }

    pub fn sz_w(&self) -> usize {
        self.w.len()
    }

    pub fn iw_mut(&mut self) -> &mut [usize] {
        &mut self.iw
    }

    pub fn w_mut(&mut self) -> &mut [T] {
        &mut self.w
    }

    /// A leading temporary of `n` words, plus the integer scratch and the
    /// floating scratch that remains after it.
    pub fn split_w(&mut self, n: usize) -> (&mut [T], &mut [usize], &mut [T]) {
        let len = self.w.len();
        let (tmp, rest) = self.w.split_at_mut(n.min(len));
        (tmp, &mut self.iw, rest)
    }
}

impl Memory<f64> {
    /// Evaluate `f` using this memory's scratch.
    pub fn call(&mut self, f: &Function, arg: &[Option<&[f64]>], res: &mut [Option<&mut [f64]>]) -> Result<()> {
        f.call_with(arg, res, &mut self.iw, &mut self.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mx::Mx;

    #[test]
    fn alloc_takes_the_union() {
        let x = Mx::sym_dense("x", 3, 3);
        let v = Mx::sym_dense("v", 3, 1);
        let f = Function::mx("f", &[x.clone()], &[x.add(&x).unwrap()]).unwrap();
        let g = Function::mx("g", &[x.clone(), v.clone()], &[x.mtimes(&v).unwrap()]).unwrap();
        let mut mem: Memory<f64> = Memory::new();
        mem.alloc(&f);
        mem.alloc(&g);
        assert_eq!(mem.sz_arg(), 2);
        assert_eq!(mem.sz_w(), f.sz_w().max(g.sz_w()));
        mem.alloc_w(4);
        assert_eq!(mem.sz_w(), f.sz_w().max(g.sz_w()) + 4);
        let (tmp, _, rest) = mem.split_w(4);
        assert_eq!(tmp.len(), 4);
        assert_eq!(rest.len(), f.sz_w().max(g.sz_w()));
    }
}
