pub mod archive;
pub mod backup_config;
pub mod change;
pub mod compress;
pub mod fingerprint;
pub mod finish;
pub mod host;
pub mod identity;
pub mod logging;
pub mod result_error;
pub mod retention;
pub mod run;
pub mod store;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
