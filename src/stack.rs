//! Fixed-capacity stack of signed 32-bit values.

use crate::vm::RuntimeError;

#[derive(Debug, Clone)]
pub struct Stack {
    values: Vec<i32>,
    capacity: usize,
}

impl Stack {
    pub fn new(capacity: usize) -> Stack {
        Stack { values: Vec::new(), capacity }
    }

    pub fn push(&mut self, value: i32) -> Result<(), RuntimeError> {
        if self.values.len() >= self.capacity {
            return Err(RuntimeError::FullStack);
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<i32, RuntimeError> {
        self.values.pop().ok_or(RuntimeError::EmptyStack)
    }

    pub fn peek(&self) -> Option<i32> {
        self.values.last().copied()
    }

    pub fn dup(&mut self) -> Result<(), RuntimeError> {
        let top = self.peek().ok_or(RuntimeError::EmptyStack)?;
        self.push(top)
    }

    pub fn swap(&mut self) -> Result<(), RuntimeError> {
        let len = self.values.len();
        if len < 2 {
            return Err(RuntimeError::EmptyStack);
        }
        self.values.swap(len - 1, len - 2);
        Ok(())
    }

    /// Rotate the top `|v|` values by one position: positive `v` sends the
    /// top value to the bottom of the window, negative brings the window's
    /// bottom value to the top.
    pub fn roll(&mut self, v: i32) -> Result<(), RuntimeError> {
        let n = v.unsigned_abs() as usize;
        let len = self.values.len();
        if n > len {
            return Err(RuntimeError::EmptyStack);
        }
        if n < 2 {
            return Ok(());
        }
        let window = &mut self.values[len - n..];
        if v > 0 {
            window.rotate_right(1);
        } else {
            window.rotate_left(1);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remaining room before the stack is full.
    pub fn free(&self) -> usize {
        self.capacity - self.values.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Bottom-to-top view of the stack.
    pub fn values(&self) -> &[i32] {
        &self.values
    }
}

impl Default for Stack {
    fn default() -> Stack {
        Stack::new(0)
    }
}
