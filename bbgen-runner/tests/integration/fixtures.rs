// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bbgen_runner::config::{InputPaths, LoadedConfig, ToolSettings};
use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use camino_tempfile_ext::prelude::*;
use indoc::indoc;

pub(crate) const WATERFALLS: &str = indoc! {r#"
    # Waterfalls and the builders on them.
    [
      {
        'name': 'chromium.linux',
        'mixins': ['chromium_pool'],
        'machines': {
          'Linux Tests': {
            'os_type': 'linux',
            'mixins': ['linux_jammy'],
            'additional_compile_targets': ['all'],
            'test_suites': {
              'gtest_tests': 'linux_gtests',
              'isolated_scripts': 'linux_matrix_scripts',
            },
          },
          'Linux Tests (dbg)': {
            'os_type': 'linux',
            'mixins': ['linux_jammy'],
            'test_suites': {
              'gtest_tests': 'linux_gtests',
            },
          },
        },
      },
      {
        'name': 'chromium.mac',
        'machines': {
          'Mac Tests': {
            'os_type': 'mac',
            'swarming': {
              'dimensions': {'os': 'Mac-14', 'cpu': 'arm64'},
            },
            'test_suites': {
              'gtest_tests': 'base_gtests',
            },
          },
        },
      },
    ]
"#};

pub(crate) const TEST_SUITES: &str = indoc! {r#"
    {
      'basic_suites': {
        'base_gtests': {
          'base_unittests': {
            'mixins': ['retry_args'],
            'linux_args': ['--linux-only'],
          },
        },
        'url_gtests': {
          'url_unittests': {
            'args': ['--verbose'],
          },
        },
        'webgpu_scripts': {
          'webgpu_cts_tests': {},
        },
      },

      'compound_suites': {
        'linux_gtests': [
          'base_gtests',
          'url_gtests',
        ],
      },

      'matrix_compound_suites': {
        'linux_matrix_scripts': {
          'webgpu_scripts': {
            'variants': [
              'DAWN_VULKAN',
              'DISABLED_VARIANT',
              {
                'identifier': 'swiftshader',
                'args': ['--use-swiftshader'],
              },
            ],
          },
        },
      },
    }
"#};

pub(crate) const EXCEPTIONS: &str = indoc! {r#"
    {
      'base_unittests': {
        'modifications': {
          'Linux Tests (dbg)': {
            'swarming': {'shards': 2},
          },
        },
        'replacements': {
          'Mac Tests': {
            'args': {'--test-launcher-retry-limit': '0'},
          },
        },
      },
      'url_unittests': {
        'remove_from': [
          'Linux Tests (dbg)',  # Too slow in debug builds.
        ],
      },
    }
"#};

pub(crate) const MIXINS: &str = indoc! {r#"
    {
      'chromium_pool': {
        'swarming': {'dimensions': {'pool': 'chromium.tests'}},
      },
      'gpu_nvidia': {
        'swarming': {'dimensions': {'gpu': '10de'}},
      },
      'linux_jammy': {
        'swarming': {'dimensions': {'os': 'Ubuntu-22.04'}},
      },
      'retry_args': {
        'args': ['--test-launcher-retry-limit=2'],
      },
    }
"#};

pub(crate) const GN_ISOLATE_MAP: &str = indoc! {r#"
    {
      'base_unittests': {
        'label': '//base:base_unittests',
        'type': 'console_test_launcher',
      },
    }
"#};

pub(crate) const EXTRA_ISOLATE_MAP: &str = indoc! {r#"
    {
      'webgpu_cts_tests': {
        'label': '//third_party/dawn/test:webgpu_cts_tests',
        'type': 'script',
      },
    }
"#};

pub(crate) const VARIANTS: &str = indoc! {r#"
    {
      'DAWN_VULKAN': {
        'identifier': 'vulkan',
        'args': ['--use-vulkan'],
        'mixins': ['gpu_nvidia'],
      },
      'DISABLED_VARIANT': {
        'identifier': 'disabled',
        'enabled': False,
      },
    }
"#};

pub(crate) const AUTOSHARDS: &str = r#"{
  "chromium.linux": {
    "Linux Tests": {
      "webgpu_cts_tests vulkan": {"shards": 3}
    }
  }
}"#;

pub(crate) const MILO_CONFIG: &str = indoc! {r#"
    consoles {
      id: "chromium.linux"
      builders {
        name: "buildbucket/luci.chromium.ci/Linux Tests"
      }
      builders {
        name: "buildbucket/luci.chromium.ci/Linux Tests (dbg)"
      }
    }
    consoles {
      id: "chromium.mac"
      builders {
        name: "buildbucket/luci.chromium.ci/Mac Tests"
      }
    }
"#};

/// A checkout-like directory with the `.pyl` files under `testing/buildbot`
/// and LUCI configuration under `infra/config`.
pub(crate) struct TempCheckout {
    pub(crate) dir: Utf8TempDir,
    pub(crate) paths: InputPaths,
}

impl TempCheckout {
    pub(crate) fn new() -> Self {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let paths = InputPaths::new(dir.path().join("testing/buildbot"))
            .with_extra_isolate_maps([dir.path().join("extra_isolate_map.pyl")]);
        let checkout = Self { dir, paths };

        for (name, contents) in [
            (InputPaths::WATERFALLS, WATERFALLS),
            (InputPaths::TEST_SUITES, TEST_SUITES),
            (InputPaths::EXCEPTIONS, EXCEPTIONS),
            (InputPaths::MIXINS, MIXINS),
            (InputPaths::GN_ISOLATE_MAP, GN_ISOLATE_MAP),
            (InputPaths::VARIANTS, VARIANTS),
        ] {
            checkout.write_pyl(name, contents);
        }
        checkout
            .dir
            .child("extra_isolate_map.pyl")
            .write_str(EXTRA_ISOLATE_MAP)
            .expect("wrote extra isolate map");
        checkout
            .dir
            .child("infra/config/targets/autoshard_exceptions.json")
            .write_str(AUTOSHARDS)
            .expect("wrote autoshard exceptions");
        checkout
            .dir
            .child("infra/config/generated/luci/luci-milo.cfg")
            .write_str(MILO_CONFIG)
            .expect("wrote milo config");
        checkout
    }

    pub(crate) fn write_pyl(&self, name: &str, contents: &str) {
        self.dir
            .child(format!("testing/buildbot/{name}"))
            .write_str(contents)
            .expect("wrote input file");
    }

    pub(crate) fn output_dir(&self) -> Utf8PathBuf {
        self.paths.pyl_files_dir.clone()
    }

    pub(crate) fn load(&self) -> LoadedConfig {
        LoadedConfig::load(&self.paths).expect("configuration loads")
    }
}

pub(crate) fn settings() -> ToolSettings {
    ToolSettings::default_settings().expect("default settings are valid")
}
