//! Generic classfile-specific definitions

/// Header of Java class file (magic number)
pub const MAGIC: u32 = 0xCAFEBABE;

/// Name of a constructor
pub const CONSTRUCTOR_METHOD_NAME: &str = "<init>";

/// Name of a static initializer
pub const STATIC_INITIALIZER_METHOD_NAME: &str = "<clinit>";

pub const VOID_METHOD_DESCRIPTOR: &str = "()V";

pub const OBJECT_CLASS: &str = "java/lang/Object";
pub const STRING_CLASS: &str = "java/lang/String";
pub const THROWABLE_CLASS: &str = "java/lang/Throwable";
pub const STRING_DESCRIPTOR: &str = "Ljava/lang/String;";

/// Upper bound of the code array of a single method
pub const MAX_CODE_LENGTH: usize = 65535;

/// JVM version constants
pub mod major_versions {
    pub const JAVA_1_1: u16 = 45;
    pub const JAVA_5_0: u16 = 49;
    /// First version that carries StackMapTable attributes
    pub const JAVA_6_0: u16 = 50;
    pub const JAVA_7: u16 = 51;
    pub const JAVA_8: u16 = 52;
}

/// Access flags for classes, fields, and methods
pub mod access_flags {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_INTERFACE: u16 = 0x0200;
}

/// Names of the attributes this crate reads, rewrites or walks
pub mod attribute_names {
    pub const CODE: &str = "Code";
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const INNER_CLASSES: &str = "InnerClasses";
    pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
    pub const SYNTHETIC: &str = "Synthetic";
    pub const SIGNATURE: &str = "Signature";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const DEPRECATED: &str = "Deprecated";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeInvisibleParameterAnnotations";
    pub const RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
    pub const RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
    pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";
    pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
    pub const METHOD_PARAMETERS: &str = "MethodParameters";
    pub const MODULE: &str = "Module";
    pub const MODULE_PACKAGES: &str = "ModulePackages";
    pub const MODULE_MAIN_CLASS: &str = "ModuleMainClass";
    pub const NEST_HOST: &str = "NestHost";
    pub const NEST_MEMBERS: &str = "NestMembers";
    pub const RECORD: &str = "Record";
    pub const PERMITTED_SUBCLASSES: &str = "PermittedSubclasses";
}
