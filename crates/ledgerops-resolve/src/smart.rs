use ledgerops_store::Value;

use crate::coerce::ValueType;
use crate::template::unescape;

/// A raw scene value together with everything it resolved through.
#[derive(Debug, Clone, PartialEq)]
pub struct SmartValue {
    pub raw: Value,
    pub ty: ValueType,
    /// Successive values, last one is the result. Never empty.
    pub steps: Vec<Value>,
}

impl SmartValue {
    pub fn value(&self) -> &Value {
        self.steps.last().unwrap_or(&self.raw)
    }

    pub fn into_value(mut self) -> Value {
        self.steps.pop().unwrap_or(self.raw)
    }

    /// `final (raw -> intermediate ...)`, e.g.
    /// `USDT-123456 (%{%{owner}_token}.identifier -> %alice_token.identifier)`.
    ///
    /// Intermediate renderings equal to the final one or to their predecessor
    /// are left out; when nothing is left the result is just `final`. Escape
    /// backslashes are not shown.
    pub fn evaluation_string(&self) -> String {
        let final_text = unescape(&self.value().to_string());
        let mut middle: Vec<String> = Vec::new();
        for step in std::iter::once(&self.raw).chain(&self.steps) {
            let text = unescape(&step.to_string());
            if text == final_text || middle.last() == Some(&text) {
                continue;
            }
            middle.push(text);
        }
        if middle.is_empty() {
            final_text
        } else {
            format!("{final_text} ({})", middle.join(" -> "))
        }
    }
}
