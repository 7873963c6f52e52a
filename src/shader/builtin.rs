//! Built-in GLSL sources.
//!
//! Registered by [`ShaderRegistry::with_builtins`](super::ShaderRegistry::with_builtins).

/// Per-frame and per-draw uniforms shared by every built-in program.
pub const COMMON: &str = r#"uniform float uTime;
uniform float uDelta;
uniform vec2 uMouse;
uniform vec2 uResolution;
uniform mat4 uView;
uniform mat4 uProjection;
uniform vec3 uCameraPos;
uniform mat4 uModel;
"#;

pub const BASIC_VERT: &str = r#"#include "common"

layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec4 aColor;
layout(location = 2) in vec2 aUv;
layout(location = 3) in vec3 aNormal;

out vec2 vUv;
out vec4 vColor;
out vec3 vWorldPos;
out vec3 vNormal;

void main() {
  vec4 worldPos = uModel * vec4(aPosition, 1.0);
  vUv = aUv;
  vColor = aColor;
  vWorldPos = worldPos.xyz;
  vNormal = mat3(uModel) * aNormal;
  gl_Position = uProjection * uView * worldPos;
}
"#;

pub const BASIC_FRAG: &str = r#"#include "common"

in vec2 vUv;
in vec4 vColor;
in vec3 vWorldPos;
in vec3 vNormal;

uniform vec4 uColor;
uniform float uReflectivity;
uniform float uRefractionRatio;

#ifdef USE_COLORMAP
uniform sampler2D uColorMap;
#endif
#ifdef USE_ALPHAMAP
uniform sampler2D uAlphaMap;
#endif
#ifdef USE_ENVMAP
uniform samplerCube uEnvMap;
#endif

out vec4 FragColor;

void main() {
  vec4 color = uColor;
#ifdef USE_VERTEX_COLOR
  color *= vColor;
#endif
#ifdef USE_COLORMAP
  color *= texture(uColorMap, vUv);
#endif
#ifdef USE_ALPHAMAP
  color.a *= texture(uAlphaMap, vUv).g;
#endif
#ifdef USE_ENVMAP
  vec3 incident = normalize(vWorldPos - uCameraPos);
#ifdef ENVMODE_REFLECTION
  vec3 dir = reflect(incident, normalize(vNormal));
#else
  vec3 dir = refract(incident, normalize(vNormal), uRefractionRatio);
#endif
  color.rgb = mix(color.rgb, texture(uEnvMap, dir).rgb, uReflectivity);
#endif
  FragColor = color;
}
"#;

pub const SKYBOX_VERT: &str = r#"#include "common"

layout(location = 0) in vec3 aPosition;

uniform mat3 uCubeMapRotation;
uniform float uFlipCubeMap;

out vec3 vDirection;

void main() {
  vec3 dir = uCubeMapRotation * aPosition;
  vDirection = vec3(uFlipCubeMap * dir.x, dir.yz);
  mat4 rotationOnly = mat4(mat3(uView));
  vec4 clip = uProjection * rotationOnly * vec4(aPosition, 1.0);
  gl_Position = clip.xyww;
}
"#;

pub const SKYBOX_FRAG: &str = r#"in vec3 vDirection;

uniform samplerCube uCubeMap;
uniform float uIntensity;

out vec4 FragColor;

void main() {
  FragColor = vec4(texture(uCubeMap, vDirection).rgb * uIntensity, 1.0);
}
"#;

/// `(name, source)` pairs in registration order.
pub const BUILTIN_SHADERS: &[(&str, &str)] = &[
    ("common", COMMON),
    ("basic_vert", BASIC_VERT),
    ("basic_frag", BASIC_FRAG),
    ("skybox_vert", SKYBOX_VERT),
    ("skybox_frag", SKYBOX_FRAG),
];
