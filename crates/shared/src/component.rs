use std::collections::BTreeMap;

use glam::Mat4;

use crate::mesh::MeshData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentType {
    Geometry,
    Transform,
    Material,
}

/// Shader pair used to draw an object, by relative asset path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub vertex_shader: String,
    pub fragment_shader: String,
}

impl Material {
    pub fn new(vertex_shader: impl Into<String>, fragment_shader: impl Into<String>) -> Self {
        Self {
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Geometry(MeshData),
    Transform(Mat4),
    Material(Material),
}

impl Component {
    pub fn component_type(&self) -> ComponentType {
        match self {
            Component::Geometry(_) => ComponentType::Geometry,
            Component::Transform(_) => ComponentType::Transform,
            Component::Material(_) => ComponentType::Material,
        }
    }
}

/// A named bag holding at most one component of each type.
#[derive(Debug, Clone, Default)]
pub struct Object {
    name: String,
    components: BTreeMap<ComponentType, Component>,
}

impl Object {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `component` unless one of the same type is already present.
    ///
    /// Returns `false` (and keeps the existing component) on a duplicate.
    pub fn add_component(&mut self, component: Component) -> bool {
        let ty = component.component_type();
        if self.components.contains_key(&ty) {
            tracing::warn!(
                "Object '{}' already has a {:?} component, ignoring the new one.",
                self.name,
                ty
            );
            return false;
        }
        self.components.insert(ty, component);
        true
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.add_component(component);
        self
    }

    pub fn has_component(&self, ty: ComponentType) -> bool {
        self.components.contains_key(&ty)
    }

    pub fn component(&self, ty: ComponentType) -> Option<&Component> {
        self.components.get(&ty)
    }

    pub fn geometry(&self) -> Option<&MeshData> {
        match self.components.get(&ComponentType::Geometry) {
            Some(Component::Geometry(mesh)) => Some(mesh),
            _ => None,
        }
    }

    /// The transform component, or identity when none was added.
    pub fn transform(&self) -> Mat4 {
        match self.components.get(&ComponentType::Transform) {
            Some(Component::Transform(transform)) => *transform,
            _ => Mat4::IDENTITY,
        }
    }

    pub fn material(&self) -> Option<&Material> {
        match self.components.get(&ComponentType::Material) {
            Some(Component::Material(material)) => Some(material),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh;
    use glam::Vec3;

    #[test]
    fn duplicate_component_is_ignored() {
        let mut object = Object::new("cube");
        assert!(object.add_component(Component::Material(Material::new("a.vert", "a.frag"))));
        assert!(!object.add_component(Component::Material(Material::new("b.vert", "b.frag"))));
        assert_eq!(object.material().unwrap().vertex_shader, "a.vert");
    }

    #[test]
    fn lookups_by_type() {
        let translation = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        let object = Object::new("cube")
            .with_component(Component::Geometry(mesh::indexed_cube()))
            .with_component(Component::Transform(translation));

        assert!(object.has_component(ComponentType::Geometry));
        assert!(!object.has_component(ComponentType::Material));
        assert_eq!(object.geometry().unwrap().indices.len(), 36);
        assert_eq!(object.transform(), translation);
        assert!(object.material().is_none());
    }

    #[test]
    fn missing_transform_is_identity() {
        assert_eq!(Object::new("empty").transform(), Mat4::IDENTITY);
    }
}
