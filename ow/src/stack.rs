use crate::{Error, RootProvider, Value, Visitable, Visitor};

/// Bookkeeping of one active call.
///
/// Layout of a frame on the value stack:
/// `[callee] [arg 1] .. [arg n] [local 1] .. [local m] [temporaries ..]`
///               ^ arg_list                  ^ fp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub arg_list: usize,
    pub fp: usize,
    /// instruction being executed, for backtraces
    pub pc: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StackInfo {
    pub capacity: usize,
    pub max_frames: usize,
}

/// Value stack plus frame records.
///
/// The bottom frame belongs to the host and has no callee.
#[derive(Debug, Clone)]
pub struct CallStack {
    values: Vec<Value>,
    frames: Vec<FrameInfo>,
    max_frames: usize,
}

impl CallStack {
    #[must_use]
    pub fn new(info: &StackInfo) -> Self {
        Self {
            values: Vec::with_capacity(info.capacity),
            frames: vec![FrameInfo {
                arg_list: 0,
                fp: 0,
                pc: 0,
            }],
            max_frames: info.max_frames.max(1),
        }
    }

    /// Returns the current stack depth
    #[inline]
    #[must_use]
    pub fn sp(&self) -> usize {
        self.values.len()
    }

    /// Returns every live value
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Pushes a value onto the stack
    #[inline]
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Pops a value, never below the current frame's locals
    #[inline]
    pub fn pop(&mut self) -> Option<Value> {
        if self.values.len() <= self.current().fp {
            return None;
        }
        self.values.pop()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<Value> {
        self.values.get(slot).copied()
    }

    #[inline]
    pub fn set(&mut self, slot: usize, value: Value) -> bool {
        match self.values.get_mut(slot) {
            Some(target) => {
                *target = value;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn truncate(&mut self, sp: usize) {
        self.values.truncate(sp);
    }

    #[inline]
    #[must_use]
    pub fn current(&self) -> &FrameInfo {
        // the host frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameInfo {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[FrameInfo] {
        &self.frames
    }

    /// Opens a frame whose arguments start at `arg_list` and whose locals start at the
    /// current top.
    pub fn push_frame(&mut self, arg_list: usize) -> Result<(), Error> {
        if self.frames.len() >= self.max_frames {
            return Err(Error::StackOverflow(self.max_frames));
        }
        self.frames.push(FrameInfo {
            arg_list,
            fp: self.values.len(),
            pc: 0,
        });
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Option<FrameInfo> {
        if self.frames.len() == 1 {
            return None;
        }
        self.frames.pop()
    }

    /// The callee of the current frame, none in the host frame.
    #[must_use]
    pub fn callee(&self) -> Option<Value> {
        let frame = self.current();
        match frame.arg_list {
            0 => None,
            arg_list => self.values.get(arg_list - 1).copied(),
        }
    }

    /// Number of arguments the current frame was called with.
    #[must_use]
    pub fn argc(&self) -> usize {
        let frame = self.current();
        frame.fp - frame.arg_list
    }

    /// Maps a local index onto a stack slot.
    ///
    /// Negative indices address arguments (-1 is the first), positive ones locals and
    /// temporaries (1 is the first), zero the top of the stack. Everything must stay inside
    /// the current frame.
    pub fn resolve(&self, index: isize) -> Result<usize, Error> {
        let frame = self.current();
        let sp = self.values.len();
        let slot = match index {
            0 if sp > frame.arg_list => Some(sp - 1),
            0 => None,
            index if index < 0 => frame
                .arg_list
                .checked_add(index.unsigned_abs() - 1)
                .filter(|&slot| slot < frame.fp),
            index => frame
                .fp
                .checked_add(index as usize - 1)
                .filter(|&slot| slot < sp),
        };
        slot.ok_or(Error::Index { index })
    }

    /// Reads a local, see [`CallStack::resolve`].
    pub fn local(&self, index: isize) -> Result<Value, Error> {
        let slot = self.resolve(index)?;
        Ok(self.values[slot])
    }

    /// Pops the top value into local `index`. Index zero is rejected.
    pub fn store_local(&mut self, index: isize) -> Result<(), Error> {
        if index == 0 || self.values.len() <= self.current().fp {
            return Err(Error::Index { index });
        }
        let slot = self.resolve(index)?;
        let value = self.values.pop().ok_or(Error::Index { index })?;
        // the popped slot may have been the target itself
        if slot < self.values.len() {
            self.values[slot] = value;
        }
        Ok(())
    }

    /// Pushes `count` copies of the top value.
    pub fn dup(&mut self, count: usize) -> Result<(), Error> {
        let top = self.local(0)?;
        self.values.extend(std::iter::repeat_n(top, count));
        Ok(())
    }

    /// Removes up to `count` values, never below the frame's first local.
    /// Returns how many values remain above that point.
    pub fn drop_values(&mut self, count: usize) -> usize {
        let fp = self.current().fp;
        let sp = self.values.len();
        let new_sp = sp.saturating_sub(count).max(fp);
        self.values.truncate(new_sp);
        new_sp - fp
    }
}

impl Visitable for CallStack {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.values.visit_edges(visitor);
    }
}

impl RootProvider for CallStack {
    fn visit_roots(&self, visitor: &mut dyn Visitor) {
        self.visit_edges(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::small_int(n).unwrap()
    }

    fn stack() -> CallStack {
        CallStack::new(&StackInfo {
            capacity: 16,
            max_frames: 4,
        })
    }

    /// callee, two arguments, two locals
    fn framed() -> CallStack {
        let mut stack = stack();
        stack.push(int(100));
        stack.push(int(1));
        stack.push(int(2));
        stack.push_frame(1).unwrap();
        stack.push(int(10));
        stack.push(int(20));
        stack
    }

    #[test]
    fn negative_indices_address_arguments() {
        let stack = framed();
        assert_eq!(stack.local(-1).unwrap(), int(1));
        assert_eq!(stack.local(-2).unwrap(), int(2));
        assert!(matches!(stack.local(-3), Err(Error::Index { index: -3 })));
        assert_eq!(stack.callee(), Some(int(100)));
        assert_eq!(stack.argc(), 2);
    }

    #[test]
    fn positive_indices_address_locals_and_zero_the_top() {
        let stack = framed();
        assert_eq!(stack.local(1).unwrap(), int(10));
        assert_eq!(stack.local(2).unwrap(), int(20));
        assert_eq!(stack.local(0).unwrap(), int(20));
    }

    #[test]
    fn out_of_frame_index_leaves_stack_untouched() {
        let stack = framed();
        let before = stack.values().to_vec();
        assert!(matches!(stack.local(5), Err(Error::Index { index: 5 })));
        assert_eq!(stack.values(), &before[..]);
    }

    #[test]
    fn store_local_pops_into_slot() {
        let mut stack = framed();
        stack.push(int(7));
        stack.store_local(1).unwrap();
        assert_eq!(stack.local(1).unwrap(), int(7));
        assert_eq!(stack.sp(), 5);
        assert!(stack.store_local(0).is_err());
    }

    #[test]
    fn drop_clamps_at_frame_pointer() {
        let mut stack = framed();
        assert_eq!(stack.drop_values(1), 1);
        assert_eq!(stack.drop_values(10), 0);
        assert_eq!(stack.sp(), 3);
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn dup_repeats_top() {
        let mut stack = framed();
        stack.dup(2).unwrap();
        assert_eq!(stack.sp(), 7);
        assert_eq!(stack.local(4).unwrap(), int(20));
    }

    #[test]
    fn host_frame_has_no_callee_and_empty_top_is_an_error() {
        let stack = stack();
        assert_eq!(stack.callee(), None);
        assert!(stack.local(0).is_err());
    }

    #[test]
    fn frame_limit_reports_overflow() {
        let mut stack = stack();
        for _ in 0..3 {
            stack.push(int(0));
            stack.push_frame(stack.sp()).unwrap();
        }
        assert!(matches!(stack.push_frame(0), Err(Error::StackOverflow(4))));
        assert_eq!(stack.depth(), 4);
        assert!(stack.pop_frame().is_some());
    }
}
