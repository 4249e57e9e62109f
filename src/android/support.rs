use crate::error::BoxedError;
use crate::WorkItem;
use jni::objects::{GlobalRef, JClass, JObject, JString, JValue};
use jni::sys::jlong;
use jni::{JNIEnv, JavaVM, NativeMethod};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub(crate) type Result<T, E = BoxedError> = std::result::Result<T, E>;

const CLASS_NAME: &str = "rs.ferry.FerryMainHandler";

/// An instance of our Java `FerryMainHandler`, which wraps an
/// `android.os.Handler` bound to the main looper.
pub(crate) struct JavaMainHandler {
    instance: GlobalRef,
}

impl JavaMainHandler {
    pub(crate) fn from_android_context() -> Result<Self> {
        let vm = java_vm()?;
        let mut env = vm.attach_current_thread()?;
        let context = android_content_context();
        let class = inject_dex_class(&mut env, &context)?;
        let instance = env.new_object(&class, "()V", &[])?;
        let instance = env.new_global_ref(instance)?;
        Ok(Self { instance })
    }

    pub(crate) fn is_main_thread(&self, env: &mut JNIEnv) -> Result<bool> {
        Ok(env
            .call_method(&self.instance, "isMainThread", "()Z", &[])?
            .z()?)
    }

    /// Returns `false` if the handler rejected the work item.
    pub(crate) fn post(&self, env: &mut JNIEnv, work_item: jlong) -> Result<bool> {
        Ok(env
            .call_method(&self.instance, "post", "(J)Z", &[JValue::Long(work_item)])?
            .z()?)
    }
}

pub(crate) fn java_vm() -> Result<JavaVM> {
    let ctx = ndk_context::android_context();
    // SAFETY: ndk_context gives us a valid pointer.
    let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }?;
    Ok(vm)
}

fn android_content_context<'local>() -> JObject<'local> {
    let ctx = ndk_context::android_context();
    // SAFETY: ndk_context gives us a valid pointer.
    unsafe { JObject::from_raw(ctx.context().cast()) }
}

/// Called by `FerryMainHandler` on the main thread with a pointer created in `post`.
extern "system" fn run_work_item<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    work_item: jlong,
) {
    // SAFETY: Java hands every posted pointer back exactly once.
    let work = unsafe { Box::from_raw(work_item as *mut WorkItem) };
    work.run_detached();
}

// Loading the class from a DEX file follows netwatcher:
// <https://github.com/thombles/netwatcher/blob/f1353ba6b9a9e4e28a223a317564a3b34a649aae/src/watch_android.rs#L94>
fn inject_dex_class<'a>(env: &mut JNIEnv<'a>, context: &JObject) -> Result<JClass<'a>> {
    let code_cache = code_cache_dir(env, context)?;
    let dex_path = code_cache.join("ferry.dex");
    write_read_only(&dex_path, include_bytes!(env!("FERRY_DEX_PATH")))?;
    let class = load_class(env, context, &dex_path, &code_cache);
    _ = fs::remove_file(&dex_path);
    let class = class?;

    env.register_native_methods(
        &class,
        &[NativeMethod {
            name: "runWorkItem".into(),
            sig: "(J)V".into(),
            fn_ptr: run_work_item as *mut _,
        }],
    )?;
    Ok(class)
}

/// API level 21 can't load DEX files from memory, so they go through `Context.getCodeCacheDir()`.
fn code_cache_dir(env: &mut JNIEnv, context: &JObject) -> Result<PathBuf> {
    let dir = env
        .call_method(context, "getCodeCacheDir", "()Ljava/io/File;", &[])?
        .l()?;
    let path: JString = env
        .call_method(&dir, "getAbsolutePath", "()Ljava/lang/String;", &[])?
        .l()?
        .into();
    let path: String = env.get_string(&path)?.into();
    Ok(PathBuf::from(path))
}

/// The class loader refuses writable DEX files.
fn write_read_only(path: &Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)?;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions)
}

fn load_class<'a>(
    env: &mut JNIEnv<'a>,
    context: &JObject,
    dex_path: &Path,
    optimized_dir: &Path,
) -> Result<JClass<'a>> {
    let parent = env
        .call_method(context, "getClassLoader", "()Ljava/lang/ClassLoader;", &[])?
        .l()?;
    let dex_path = env.new_string(dex_path.to_string_lossy())?;
    let optimized_dir = env.new_string(optimized_dir.to_string_lossy())?;
    let loader = env.new_object(
        "dalvik/system/DexClassLoader",
        "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;Ljava/lang/ClassLoader;)V",
        &[
            JValue::from(&dex_path),
            JValue::from(&optimized_dir),
            JValue::from(&JObject::null()),
            JValue::from(&parent),
        ],
    )?;
    let class_name = env.new_string(CLASS_NAME)?;
    let class = env
        .call_method(
            &loader,
            "loadClass",
            "(Ljava/lang/String;)Ljava/lang/Class;",
            &[JValue::from(&class_name)],
        )?
        .l()?;
    Ok(class.into())
}
