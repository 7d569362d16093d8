//! Lua evaluation context
//!
//! Binds the engine to an `mlua::Lua` state. The state is usually the one
//! the host process already runs its scripts in, so requests see and change
//! live globals.

use crate::engine::{CompileMode, EvalContext};
use mlua::{Function, Lua, MultiValue, Value};

// Chunk name used in diagnostics ("repl:1: ...")
const CHUNK_NAME: &str = "=repl";

/// Evaluation context over a shared Lua state
pub struct LuaContext {
    lua: Lua,
}

impl LuaContext {
    /// Fresh state with the standard libraries
    pub fn new() -> Self {
        Self { lua: Lua::new() }
    }

    /// Bind to a state owned by the host
    pub fn from_lua(lua: Lua) -> Self {
        Self { lua }
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn into_lua(self) -> Lua {
        self.lua
    }

    /// Render a value through the state's own `tostring`
    ///
    /// Lua strings are byte strings; bytes that are not UTF-8 are replaced
    /// rather than failing the request.
    fn stringify(&self, value: Value) -> mlua::Result<String> {
        let tostring: Function = self.lua.globals().get("tostring")?;
        let text: mlua::String = tostring.call(value)?;
        Ok(text.to_string_lossy().into())
    }
}

impl Default for LuaContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalContext for LuaContext {
    type Unit = Function;

    fn compile(&self, source: &str, mode: CompileMode) -> Result<Function, String> {
        let chunk = match mode {
            CompileMode::Expression => format!("return {}", source),
            CompileMode::Statements => source.to_string(),
        };

        self.lua
            .load(chunk)
            .set_name(CHUNK_NAME)
            .into_function()
            .map_err(describe_error)
    }

    fn execute(&self, unit: Function) -> Result<String, String> {
        let values: MultiValue = unit.call(()).map_err(describe_error)?;
        let first = values.into_iter().next().unwrap_or(Value::Nil);
        self.stringify(first).map_err(describe_error)
    }
}

/// Reduce an mlua error to the message a Lua user expects
fn describe_error(err: mlua::Error) -> String {
    match err {
        mlua::Error::SyntaxError { message, .. } => message,
        mlua::Error::RuntimeError(message) => message,
        mlua::Error::CallbackError { cause, .. } => cause.to_string(),
        other => other.to_string(),
    }
}
