//! The embedded runtime helper library.
//!
//! A small ES module parsed as source index 0 of every build. Lowering
//! emits references to these helpers by name; the linker merges those
//! references with this module's exports, so tree shaking keeps only the
//! helpers the bundle actually calls.

/// The logical path the runtime appears under in diagnostics.
pub const RUNTIME_PATH: &str = "<runtime>";

pub const RUNTIME_SOURCE: &str = r#"
export var __pow = Math.pow;

var __hasOwnProp = Object.prototype.hasOwnProperty;
var __propIsEnum = Object.prototype.propertyIsEnumerable;
var __getOwnPropSymbols = Object.getOwnPropertySymbols;
var __defProp = Object.defineProperty;

export var __spreadValues = (a, b) => {
  for (var prop in b || (b = {}))
    if (__hasOwnProp.call(b, prop))
      a[prop] = b[prop];
  if (__getOwnPropSymbols)
    for (var sym of __getOwnPropSymbols(b))
      if (__propIsEnum.call(b, sym))
        a[sym] = b[sym];
  return a;
};

export var __spreadProps = (a, b) =>
  Object.defineProperties(a, Object.getOwnPropertyDescriptors(b));

export var __objRest = (source, exclude) => {
  var target = {};
  for (var prop in source)
    if (__hasOwnProp.call(source, prop) && exclude.indexOf(prop) < 0)
      target[prop] = source[prop];
  if (source != null && __getOwnPropSymbols)
    for (var sym of __getOwnPropSymbols(source))
      if (exclude.indexOf(sym) < 0 && __propIsEnum.call(source, sym))
        target[sym] = source[sym];
  return target;
};

var __accessCheck = (obj, member, msg) => {
  if (!member.has(obj)) throw TypeError("Cannot " + msg);
};

export var __privateGet = (obj, member, getter) => {
  __accessCheck(obj, member, "read from private field");
  return getter ? getter.call(obj) : member.get(obj);
};

export var __privateAdd = (obj, member, value) => {
  if (member.has(obj))
    throw TypeError("Cannot add the same private member more than once");
  if (member instanceof WeakSet) member.add(obj);
  else member.set(obj, value);
};

export var __privateSet = (obj, member, value, setter) => {
  __accessCheck(obj, member, "write to private field");
  if (setter) setter.call(obj, value);
  else member.set(obj, value);
  return value;
};

export var __privateMethod = (obj, member, method) => {
  __accessCheck(obj, member, "access private method");
  return method;
};

export var __privateIn = (member, obj) =>
  Object(obj) === obj && member.has(obj);

export var __privateWrapper = (obj, member, setter, getter) => ({
  set _(value) {
    __privateSet(obj, member, value, setter);
  },
  get _() {
    return __privateGet(obj, member, getter);
  }
});

export var __async = (thisArg, args, fn) =>
  new Promise((resolve, reject) => {
    var gen = args ? fn.apply(thisArg, args) : fn.call(thisArg);
    var fulfilled = (value) => {
      try {
        step(gen.next(value));
      } catch (e) {
        reject(e);
      }
    };
    var rejected = (value) => {
      try {
        step(gen.throw(value));
      } catch (e) {
        reject(e);
      }
    };
    var step = (result) =>
      result.done
        ? resolve(result.value)
        : Promise.resolve(result.value).then(fulfilled, rejected);
    fulfilled();
  });

export var __await = (value) => ({ __await: value });

export var __asyncGenerator = (thisArg, args, fn) => {
  var gen = args ? fn.apply(thisArg, args) : fn.call(thisArg);
  var method = (kind) => (value) =>
    new Promise((resolve, reject) => {
      var step = (result) => {
        if (result.done) {
          resolve({ value: result.value, done: true });
          return;
        }
        var v = result.value;
        if (v != null && typeof v === "object" && "__await" in v) {
          Promise.resolve(v.__await).then(
            (inner) => {
              try {
                step(gen.next(inner));
              } catch (e) {
                reject(e);
              }
            },
            (err) => {
              try {
                step(gen.throw(err));
              } catch (e) {
                reject(e);
              }
            }
          );
        } else {
          resolve({ value: v, done: false });
        }
      };
      try {
        step(gen[kind](value));
      } catch (e) {
        reject(e);
      }
    });
  var it = {};
  it.next = method("next");
  it.throw = method("throw");
  it.return = method("return");
  it[Symbol.asyncIterator] = () => it;
  return it;
};

export var __forAwait = (obj) => {
  var method = obj[Symbol.asyncIterator];
  if (method) return method.call(obj);
  var it = obj[Symbol.iterator]();
  return {
    next: (v) => Promise.resolve(it.next(v)),
    return: (v) =>
      Promise.resolve(it.return ? it.return(v) : { value: v, done: true })
  };
};

export var __using = (stack, value, isAsync) => {
  if (value != null) {
    if (typeof value !== "object" && typeof value !== "function")
      throw TypeError("Object expected to be assigned to \"using\" declaration");
    var dispose;
    if (isAsync) dispose = value[Symbol.asyncDispose || Symbol.for("Symbol.asyncDispose")];
    if (dispose === void 0) dispose = value[Symbol.dispose || Symbol.for("Symbol.dispose")];
    if (typeof dispose !== "function")
      throw TypeError("Object not disposable");
    stack.push([isAsync, dispose, value]);
  } else if (isAsync) {
    stack.push([isAsync]);
  }
  return value;
};

export var __callDispose = (stack, error, hasError) => {
  var fail = (e) => {
    error = e;
    hasError = true;
  };
  var next = () => {
    while (stack.length) {
      var entry = stack.pop();
      try {
        var result = entry[1] && entry[1].call(entry[2]);
        if (entry[0]) return Promise.resolve(result).then(next, (e) => (fail(e), next()));
      } catch (e) {
        fail(e);
      }
    }
    if (hasError) throw error;
  };
  return next();
};

export var __template = (cooked, raw) =>
  Object.freeze(__defProp(cooked, "raw", { value: Object.freeze(raw || cooked.slice()) }));

export var __decorateClass = (decorators, target, key, kind) => {
  var result = kind > 1 ? void 0 : kind ? Object.getOwnPropertyDescriptor(target, key) : target;
  for (var i = decorators.length - 1; i >= 0; i--)
    if (decorators[i])
      result = (kind ? decorators[i](target, key, result) : decorators[i](result)) || result;
  if (kind && result) __defProp(target, key, result);
  return result;
};

export var __decorateParam = (index, decorator) => (target, key) =>
  decorator(target, key, index);

export var __superGet = (cls, obj, key) =>
  Reflect.get(Object.getPrototypeOf(cls), key, obj);

export var __superSet = (cls, obj, key, value) =>
  Reflect.set(Object.getPrototypeOf(cls), key, value, obj);

export var __superWrapper = (cls, obj, key) => ({
  get _() {
    return __superGet(cls, obj, key);
  },
  set _(value) {
    __superSet(cls, obj, key, value);
  }
});

export var __name = (target, value) =>
  __defProp(target, "name", { value: value, configurable: true });

export var __commonJS = (cb) => {
  var mod;
  return () => (mod || cb((mod = { exports: {} }).exports, mod), mod.exports);
};

export var __esm = (fn) => {
  var result;
  return () => (fn && (result = fn(), fn = 0), result);
};

export var __export = (target, all) => {
  for (var name in all)
    __defProp(target, name, { get: all[name], enumerable: true });
};

export var __reExport = (target, mod) => {
  var copy = (key) =>
    __defProp(target, key, { get: () => mod[key], enumerable: true });
  for (var key in mod)
    if (key !== "default" && !__hasOwnProp.call(target, key)) copy(key);
  return target;
};

export var __toESM = (mod) => {
  if (mod && mod.__esModule) return mod;
  var target = {};
  if (mod != null)
    for (var key in mod)
      if (__hasOwnProp.call(mod, key)) target[key] = mod[key];
  target.default = mod;
  return target;
};

export var __toCommonJS = (mod) => {
  var target = {};
  target.__esModule = true;
  if (mod != null)
    for (var key in mod)
      if (__hasOwnProp.call(mod, key)) target[key] = mod[key];
  return target;
};
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_common::{Loader, Log, Source, SourceIndex};
    use kestrel_parser::binder::bind;
    use kestrel_parser::js_parser::{parse, ParserOptions};
    use std::sync::Arc;

    #[test]
    fn test_runtime_parses_cleanly() {
        let log = Log::new();
        let source = Source {
            index: SourceIndex::RUNTIME,
            key_path: RUNTIME_PATH.to_string(),
            pretty_path: RUNTIME_PATH.to_string(),
            namespace: "file".to_string(),
            loader: Loader::Js,
            contents: Arc::from(RUNTIME_SOURCE),
        };
        let options = ParserOptions::default();
        let mut ast = parse(&source, &options, &log);
        bind(&mut ast, &options, &log, 0);
        assert!(!log.has_errors(), "{:?}", log.take_msgs());
        // Every helper the lowering pass can emit must be exported
        for helper in [
            "__pow",
            "__spreadValues",
            "__spreadProps",
            "__objRest",
            "__privateGet",
            "__privateSet",
            "__privateAdd",
            "__privateMethod",
            "__privateIn",
            "__privateWrapper",
            "__async",
            "__asyncGenerator",
            "__await",
            "__forAwait",
            "__using",
            "__callDispose",
            "__template",
            "__decorateClass",
            "__decorateParam",
            "__superGet",
            "__superSet",
            "__superWrapper",
            "__name",
            "__toESM",
            "__toCommonJS",
            "__commonJS",
            "__esm",
            "__export",
            "__reExport",
        ] {
            assert!(
                ast.named_exports.contains_key(helper),
                "runtime is missing {helper}"
            );
        }
    }
}
