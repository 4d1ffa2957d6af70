/// Runtime error raised by the VM. Fatal to the invocation; the call
/// stack context is attached as the error unwinds out of `run`.
#[derive(Debug, Clone)]
pub struct VmError {
    pub message: String,
    pub call_stack: Vec<String>,
}

impl VmError {
    pub fn new(msg: impl Into<String>) -> Self {
        VmError {
            message: msg.into(),
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;
            for (i, frame) in self.call_stack.iter().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for VmError {}

pub fn stack_underflow() -> VmError {
    VmError::new("stack underflow")
}

pub fn type_error(expected: &str, got: &str) -> VmError {
    VmError::new(format!("type error: expected {}, got {}", expected, got))
}

pub fn division_by_zero() -> VmError {
    VmError::new("division by zero")
}

pub fn undefined_function(name: &str) -> VmError {
    VmError::new(format!("undefined function '{}'", name))
}

pub fn not_an_array(got: &str) -> VmError {
    VmError::new(format!("cannot index a {} (not an array)", got))
}

pub fn negative_index(index: i64) -> VmError {
    VmError::new(format!("cannot write array element at negative index {}", index))
}
