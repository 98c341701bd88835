//! # Runtime
//!
//! Collaborators the node core wires together: codecs, the root store, the
//! module manager and the runtime app manager. Each is registered with the
//! resolver through an explicit provider list:
//!
//! | List | Provides |
//! |------|----------|
//! | [`default_service_bindings`] | module configs, `ModuleManager`, `AppBuilder`, `StoreBuilder`, `AutoCliOptions` |
//! | [`codec_providers`] | `InterfaceRegistry`, `LegacyAmino`, `Codec`, `TxConfig`, address codecs |

pub mod app;
pub mod codec;
pub mod module;
pub mod store;

use std::sync::Arc;

use mini_inject::{invoke2, provide0, provide1, provide2, Outputs, Provider, ProviderRegistry};

use crate::client::AutoCliOptions;
use crate::config::RootStoreConfig;

use app::AppBuilder;
use codec::{
    register_std_amino, register_std_interfaces, AccountAddressCodec, AddressCodec, Codec,
    ConsensusAddressCodec, InterfaceRegistry, LegacyAmino, TxConfig, TxConfigOptions,
    ValidatorAddressCodec,
};
use module::{
    AppModulesConfig, AuthModuleConfig, ModuleManager, RuntimeModuleConfig, StakingModuleConfig,
    RUNTIME_MODULE,
};
use store::StoreBuilder;

/// Runtime service bindings: module wiring, app/store builders and the
/// module registration invokers.
pub fn default_service_bindings() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry
        .provide(
            Provider::new("runtime.module_configs")
                .input::<AppModulesConfig>()
                .output::<RuntimeModuleConfig>()
                .output::<AuthModuleConfig>()
                .output::<StakingModuleConfig>()
                .build(|inputs| {
                    let modules = inputs.get::<AppModulesConfig>()?;
                    let runtime: RuntimeModuleConfig = modules.module_config(RUNTIME_MODULE)?;
                    let auth: AuthModuleConfig = modules.module_config("auth")?;
                    let staking: StakingModuleConfig = modules.module_config("staking")?;
                    Ok(Outputs::new().with(runtime).with(auth).with(staking))
                }),
        )
        .provide(provide2(
            "runtime.module_manager",
            |modules: &AppModulesConfig, runtime: &RuntimeModuleConfig| {
                Ok(ModuleManager::from_config(modules, runtime)?)
            },
        ))
        .provide(
            Provider::new("runtime.app_builder")
                .input::<RuntimeModuleConfig>()
                .input::<ModuleManager>()
                .output::<AppBuilder>()
                .build(|inputs| {
                    let runtime = inputs.cloned::<RuntimeModuleConfig>()?;
                    let modules = inputs.get::<ModuleManager>()?;
                    Ok(Outputs::new().with(AppBuilder::new(runtime, modules)))
                }),
        )
        .provide(provide1(
            "runtime.store_builder",
            |config: &RootStoreConfig| Ok(StoreBuilder::new(config.clone())),
        ))
        .provide(provide1(
            "runtime.autocli_options",
            |modules: &ModuleManager| Ok(AutoCliOptions::from_module_manager(modules)),
        ))
        .invoke(invoke2(
            "runtime.register_interfaces",
            |modules: &ModuleManager, registry: &InterfaceRegistry| {
                Ok(modules.register_interfaces(registry)?)
            },
        ))
        .invoke(invoke2(
            "runtime.register_legacy_amino",
            |modules: &ModuleManager, amino: &LegacyAmino| {
                modules.register_legacy_amino(amino);
                Ok(())
            },
        ));
    registry
}

/// Codec providers shared by client and server mode.
pub fn codec_providers() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry
        .provide(provide0("codec.interface_registry", || {
            let interfaces = InterfaceRegistry::new();
            register_std_interfaces(&interfaces)?;
            Ok(interfaces)
        }))
        .provide(provide0("codec.legacy_amino", || {
            let amino = LegacyAmino::new();
            register_std_amino(&amino);
            Ok(amino)
        }))
        .provide(
            Provider::new("codec.codec")
                .input::<InterfaceRegistry>()
                .output::<Codec>()
                .build(|inputs| {
                    let interfaces = inputs.get::<InterfaceRegistry>()?;
                    Ok(Outputs::new().with(Codec::new(interfaces)))
                }),
        )
        .provide(provide0("codec.tx_config_options", || {
            Ok(TxConfigOptions::default())
        }))
        .provide(
            Provider::new("codec.tx_config")
                .input::<Codec>()
                .input::<TxConfigOptions>()
                .output::<TxConfig>()
                .build(|inputs| {
                    let codec: Arc<Codec> = inputs.get::<Codec>()?;
                    let options = inputs.cloned::<TxConfigOptions>()?;
                    Ok(Outputs::new().with(TxConfig::new(codec, options)))
                }),
        )
        .provide(
            Provider::new("codec.address_codecs")
                .input::<AuthModuleConfig>()
                .input::<StakingModuleConfig>()
                .output::<AccountAddressCodec>()
                .output::<ValidatorAddressCodec>()
                .output::<ConsensusAddressCodec>()
                .build(|inputs| {
                    let auth = inputs.get::<AuthModuleConfig>()?;
                    let staking = inputs.get::<StakingModuleConfig>()?;
                    Ok(Outputs::new()
                        .with(AccountAddressCodec(AddressCodec::new(&auth.bech32_prefix)))
                        .with(ValidatorAddressCodec(AddressCodec::new(
                            &staking.bech32_prefix_validator,
                        )))
                        .with(ConsensusAddressCodec(AddressCodec::new(
                            &staking.bech32_prefix_consensus,
                        ))))
                }),
        );
    registry
}
