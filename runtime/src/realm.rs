//! Realm: one global object plus its intrinsic prototype graph (spec §3.3,
//! §6). Grounded on `nova_vm::ecmascript::execution::realm::Realm`, trimmed
//! to the handful of intrinsics `runtime::builtins` actually populates.

use crate::environment::{Environment, EnvironmentRef};
use crate::object::{ObjectData, ObjectRef};

pub struct Intrinsics {
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub error_prototype: ObjectRef,
    pub promise_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub number_prototype: ObjectRef,
    pub boolean_prototype: ObjectRef,
}

pub struct Realm {
    pub global_object: ObjectRef,
    pub global_env: EnvironmentRef,
    pub intrinsics: Intrinsics,
}

impl Realm {
    pub fn new() -> Self {
        let object_prototype = ObjectData::new(None);
        let function_prototype = ObjectData::new(Some(object_prototype.clone()));
        let array_prototype = ObjectData::new(Some(object_prototype.clone()));
        let error_prototype = ObjectData::new(Some(object_prototype.clone()));
        let promise_prototype = ObjectData::new(Some(object_prototype.clone()));
        let string_prototype = ObjectData::new(Some(object_prototype.clone()));
        let number_prototype = ObjectData::new(Some(object_prototype.clone()));
        let boolean_prototype = ObjectData::new(Some(object_prototype.clone()));

        let global_object = ObjectData::new(Some(object_prototype.clone()));
        let global_env = Environment::new_global(global_object.clone());

        let mut realm = Realm {
            global_object,
            global_env,
            intrinsics: Intrinsics {
                object_prototype,
                function_prototype,
                array_prototype,
                error_prototype,
                promise_prototype,
                string_prototype,
                number_prototype,
                boolean_prototype,
            },
        };
        crate::builtins::populate(&mut realm);
        realm
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}
