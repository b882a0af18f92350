use crate::interpreter::{InvocationListener, Value};
use crate::ir::CallSite;

const CLASS: &str = "java/lang/Class";
const CLASS_LOADER: &str = "java/lang/ClassLoader";

/// An API element named by a constant operand of a reflective call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReflectiveTarget {
    Class(String),
    Method { class_name: String, name: String },
    Field { class_name: String, name: String },
}

/// Collects reflective lookups whose class and member names are constants.
///
/// `Class.forName` and `ClassLoader.loadClass` evaluate to the class they load, so a lookup
/// chained on their result is recognised as well.
#[derive(Debug, Default)]
pub struct ReflectionListener {
    targets: Vec<ReflectiveTarget>,
}

impl ReflectionListener {
    pub fn into_targets(self) -> Vec<ReflectiveTarget> {
        self.targets
    }
}

fn binary_name(name: &str) -> String {
    name.replace('.', "/")
}

impl InvocationListener for ReflectionListener {
    fn on_invoke(&mut self, call: &CallSite, receiver: Option<&Value>, args: &[Value]) -> Value {
        let loads_class = (call.owner == CLASS && call.name == "forName")
            || (call.owner == CLASS_LOADER && call.name == "loadClass");
        if loads_class {
            if let Some(Value::Str(name)) = args.first() {
                let class_name = binary_name(name);
                self.targets.push(ReflectiveTarget::Class(class_name.clone()));
                return Value::Class(class_name);
            }
            return Value::Unknown;
        }

        if call.owner != CLASS {
            return Value::Unknown;
        }
        let (Some(Value::Class(class_name)), Some(Value::Str(name))) = (receiver, args.first())
        else {
            return Value::Unknown;
        };
        let class_name = class_name.clone();
        let name = name.clone();
        match call.name.as_str() {
            "getMethod" | "getDeclaredMethod" => {
                self.targets.push(ReflectiveTarget::Method { class_name, name });
            }
            "getField" | "getDeclaredField" => {
                self.targets.push(ReflectiveTarget::Field { class_name, name });
            }
            _ => {}
        }
        Value::Unknown
    }
}
