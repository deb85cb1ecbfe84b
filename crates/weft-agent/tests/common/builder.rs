use weft_classfile::{
    access_flags, AttributeInfo, ClassFile, CodeAttribute, ConstantPool, ExceptionHandler,
    MemberInfo,
};

/// Builds small fixture classes directly against the class-file model.
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.ensure_class(name).unwrap();
        let super_class = pool.ensure_class("java/lang/Object").unwrap();
        Self {
            class: ClassFile {
                minor_version: 0,
                major_version: 52,
                constant_pool: pool,
                access_flags: access_flags::PUBLIC | access_flags::SUPER,
                this_class,
                super_class,
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                attributes: Vec::new(),
            },
        }
    }

    /// Interns a methodref so fixture code can call across methods.
    pub fn methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.class.constant_pool.ensure_methodref(class, name, descriptor).unwrap()
    }

    pub fn field(&mut self, name: &str, descriptor: &str) -> &mut Self {
        let name_index = self.class.constant_pool.ensure_utf8(name).unwrap();
        let descriptor_index = self.class.constant_pool.ensure_utf8(descriptor).unwrap();
        self.class.fields.push(MemberInfo {
            access_flags: access_flags::PUBLIC,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self
    }

    pub fn method(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
    ) -> &mut Self {
        self.method_with_handlers(access, name, descriptor, max_stack, max_locals, code, Vec::new())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn method_with_handlers(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
        exception_table: Vec<ExceptionHandler>,
    ) -> &mut Self {
        let pool = &mut self.class.constant_pool;
        let name_index = pool.ensure_utf8(name).unwrap();
        let descriptor_index = pool.ensure_utf8(descriptor).unwrap();
        let code_name = pool.ensure_utf8("Code").unwrap();
        let attr = CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes: Vec::new(),
        };
        self.class.methods.push(MemberInfo {
            access_flags: access,
            name_index,
            descriptor_index,
            attributes: vec![AttributeInfo { name_index: code_name, info: attr.to_bytes().unwrap() }],
        });
        self
    }

    /// Attaches a raw attribute to the `Code` attribute of the most
    /// recently added method (for StackMapTable shift fixtures).
    pub fn code_attribute(&mut self, attr_name: &str, info: Vec<u8>) -> &mut Self {
        let pool = &mut self.class.constant_pool;
        let attr_name_index = pool.ensure_utf8(attr_name).unwrap();
        let method = self.class.methods.last_mut().unwrap();
        let code_index = method.attribute_index(pool, "Code").unwrap();
        let mut code = CodeAttribute::parse(&method.attributes[code_index].info).unwrap();
        code.attributes.push(AttributeInfo { name_index: attr_name_index, info });
        method.attributes[code_index].info = code.to_bytes().unwrap();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.class.to_bytes()
    }
}
